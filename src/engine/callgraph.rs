//! Call graph and resolution order

use crate::ast::{ProcId, Program};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

/// A strongly-connected set of procedures, resolved as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallGroup {
    pub members: Vec<ProcId>,
    /// More than one member, or a procedure calling itself.
    pub recursive: bool,
}

/// Call groups ordered callees first.
///
/// Edges run caller → callee; Tarjan's algorithm emits components in
/// reverse topological order, which is exactly callees before callers.
/// Calls to names the program does not define add no edge.
pub fn resolution_order(program: &Program) -> Vec<CallGroup> {
    let table = program.table();
    let mut graph: DiGraph<ProcId, ()> = DiGraph::new();
    let nodes: Vec<_> = (0..program.procedures.len()).map(|id| graph.add_node(id)).collect();
    let mut self_calls = vec![false; program.procedures.len()];

    for (caller, proc) in program.procedures.iter().enumerate() {
        for callee in proc.callees() {
            if let Some(target) = table.get(callee) {
                if target == caller {
                    self_calls[caller] = true;
                }
                graph.update_edge(nodes[caller], nodes[target], ());
            }
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .map(|scc| {
            let mut members: Vec<ProcId> = scc.into_iter().map(|idx| graph[idx]).collect();
            members.sort_unstable();
            let recursive = members.len() > 1 || self_calls[members[0]];
            CallGroup { members, recursive }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn names(program: &Program, order: &[CallGroup]) -> Vec<Vec<String>> {
        order
            .iter()
            .map(|g| g.members.iter().map(|id| program.procedures[*id].name.clone()).collect())
            .collect()
    }

    #[test]
    fn test_callees_come_first() {
        let program = parse_program(
            "main_proc(n)\nbegin\n  call helper(n)\nend\nhelper(n)\nbegin\n  call leaf(n)\nend\nleaf(n)\nbegin\n  x <- n\nend",
            "order.psc",
        )
        .unwrap();
        let order = resolution_order(&program);
        assert_eq!(
            names(&program, &order),
            vec![vec!["leaf".to_string()], vec!["helper".to_string()], vec!["main_proc".to_string()]]
        );
        assert!(order.iter().all(|g| !g.recursive));
    }

    #[test]
    fn test_mutual_recursion_forms_one_group() {
        let program = parse_program(
            "a(n)\nbegin\n  call b(n - 1)\nend\nb(n)\nbegin\n  call a(n - 1)\n  call c(n)\nend\nc(n)\nbegin\nend\nd(n)\nbegin\n  call d(n - 1)\n  call ext(n)\nend",
            "groups.psc",
        )
        .unwrap();
        let order = resolution_order(&program);
        let groups = names(&program, &order);
        let ab = groups.iter().position(|g| g == &vec!["a".to_string(), "b".to_string()]).unwrap();
        let c = groups.iter().position(|g| g == &vec!["c".to_string()]).unwrap();
        assert!(c < ab);
        assert!(order[ab].recursive);
        let d = groups.iter().position(|g| g == &vec!["d".to_string()]).unwrap();
        assert!(order[d].recursive);
        assert!(!order[c].recursive);
    }
}
