//! Structural Complexity Engine
//!
//! Resolves every procedure of a program bottom-up over the call graph.
//! Each strongly-connected group of procedures is handled as one unit:
//!
//! 1. Fingerprint the group and serve it from the knowledge base if every
//!    member is already known.
//! 2. Otherwise fold each body into worst/best case costs ([`rules`]), with
//!    loop trip counts from [`loops`] and irregular loops sent to the oracle.
//! 3. Recursive groups go through the recurrence resolver; when it cannot
//!    decide, the whole group is sent to the oracle.
//! 4. Known verdicts are stored under their fingerprints.
//!
//! Files of a batch are analyzed in parallel ([`batch`]); procedures of one
//! file are resolved in dependency order on one worker.

mod batch;
mod callgraph;
mod loops;
pub mod report;
mod rules;

pub use callgraph::{resolution_order, CallGroup};
pub use report::{FileOutcome, ProcedureReport, ProcedureStatus, ProgramReport, Rule, TraceStep, MAIN_BLOCK};

use crate::ast::{Block, Param, Position, ProcId, Procedure, Program, VisitState};
use crate::complexity::{ComplexityVerdict, Provenance, UnknownCause, FORMAL_CONFIDENCE};
use crate::error::ParseFailure;
use crate::fingerprint::{block_fingerprint, procedure_fingerprint, Fingerprint};
use crate::knowledge::{KnowledgeBase, StoreOutcome};
use crate::oracle::{render_procedure, OracleGateway, OracleRequest, RequestKind};
use crate::parser::parse_program;
use crate::recurrence::{self, GroupMember};
use rules::{failed_verdict, Scope, Walker};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Called with (file, completed, total) as files finish.
pub type ProgressCallback = Box<dyn Fn(&str, usize, usize) + Send + Sync>;

pub struct AnalysisEngine {
    kb: Arc<KnowledgeBase>,
    gateway: Arc<OracleGateway>,
    workers: usize,
    progress_callback: Option<ProgressCallback>,
    cancel: Arc<AtomicBool>,
}

impl AnalysisEngine {
    /// Create an engine. `workers == 0` picks the machine's parallelism.
    pub fn new(workers: usize, kb: Arc<KnowledgeBase>, gateway: Arc<OracleGateway>) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
                .min(16)
        } else {
            workers
        };
        Self {
            kb,
            gateway,
            workers,
            progress_callback: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn gateway(&self) -> &OracleGateway {
        &self.gateway
    }

    /// Parse and analyze one source text.
    pub fn analyze_source(&self, source: &str, file: &str) -> Result<ProgramReport, ParseFailure> {
        let mut program = parse_program(source, file)?;
        let mut report = self.analyze_program(&mut program);
        report.file = file.to_string();
        Ok(report)
    }

    /// Resolve every procedure, then the main block.
    ///
    /// Verdicts are written back onto the procedures. A cancelled run stops
    /// at the next group boundary and reports the rest as skipped.
    pub fn analyze_program(&self, program: &mut Program) -> ProgramReport {
        let order = resolution_order(program);
        info!(
            "Analyzing {}: {} procedures in {} call groups",
            program.name,
            program.procedures.len(),
            order.len()
        );

        let mut verdicts: HashMap<String, ComplexityVerdict> = HashMap::new();
        let mut fingerprints: HashMap<String, Fingerprint> = HashMap::new();
        let mut reports = Vec::with_capacity(program.procedures.len() + 1);
        let mut cancelled = false;

        for group in &order {
            if self.cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
            for &id in &group.members {
                program.procedures[id].state = VisitState::Visiting;
            }
            let results = {
                let scope = Scope {
                    kb: &self.kb,
                    gateway: &self.gateway,
                    program: &*program,
                    verdicts: &verdicts,
                    fingerprints: &fingerprints,
                };
                if group.recursive {
                    self.resolve_group(scope, &group.members)
                } else {
                    vec![self.resolve_single(scope, group.members[0])]
                }
            };
            for (&id, report) in group.members.iter().zip(results) {
                let proc = &mut program.procedures[id];
                proc.state = VisitState::Resolved;
                proc.verdict = report.verdict.clone();
                if let Some(v) = &report.verdict {
                    verdicts.insert(proc.name.clone(), v.clone());
                }
                if let Some(fp) = &report.fingerprint {
                    fingerprints.insert(proc.name.clone(), fp.clone());
                }
                reports.push(report);
            }
        }

        if cancelled {
            let skipped: Vec<ProcedureReport> = program
                .procedures
                .iter()
                .filter(|p| p.state != VisitState::Resolved)
                .map(|p| ProcedureReport::skipped(&p.name, p.position))
                .collect();
            warn!("Analysis of {} cancelled, {} procedures skipped", program.name, skipped.len());
            reports.extend(skipped);
            if let Some(main) = &program.main {
                reports.push(ProcedureReport::skipped(MAIN_BLOCK, main.position));
            }
        } else if let Some(main) = &program.main {
            let scope = Scope {
                kb: &self.kb,
                gateway: &self.gateway,
                program: &*program,
                verdicts: &verdicts,
                fingerprints: &fingerprints,
            };
            reports.push(self.resolve_main(scope, main));
        }

        ProgramReport {
            file: program.name.clone(),
            procedures: reports,
            cancelled,
        }
    }

    fn memoized(&self, fp: &Fingerprint) -> Option<ComplexityVerdict> {
        match self.kb.lookup_verdict(fp) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Knowledge base lookup for {} failed, treating as miss: {}", fp.short(), e);
                None
            }
        }
    }

    /// Persist a verdict. Unknown and error verdicts are never stored.
    fn remember(&self, fp: &Fingerprint, verdict: &ComplexityVerdict) {
        if verdict.is_unknown() || verdict.provenance == Provenance::Error {
            return;
        }
        match self.kb.store(fp, verdict) {
            Ok(StoreOutcome::Rejected) => debug!("Kept stored record for {} over a weaker verdict", fp.short()),
            Ok(_) => {}
            Err(e) => warn!("Could not store verdict for {}: {}", fp.short(), e),
        }
    }

    fn resolve_single(&self, scope: Scope<'_>, id: ProcId) -> ProcedureReport {
        let proc = &scope.program.procedures[id];
        let no_group = HashSet::new();
        let fp = procedure_fingerprint(proc, &|n| scope.callee_ref(n, &proc.name, &no_group));
        self.resolve_body(scope, &proc.name, proc.position, &proc.params, &proc.body, fp)
    }

    fn resolve_main(&self, scope: Scope<'_>, main: &Block) -> ProcedureReport {
        let no_group = HashSet::new();
        let fp = block_fingerprint(main, &|n| scope.callee_ref(n, MAIN_BLOCK, &no_group));
        self.resolve_body(scope, MAIN_BLOCK, main.position, &[], main, fp)
    }

    fn resolve_body(
        &self,
        scope: Scope<'_>,
        name: &str,
        position: Position,
        params: &[Param],
        body: &Block,
        fp: Fingerprint,
    ) -> ProcedureReport {
        if let Some(verdict) = self.memoized(&fp) {
            debug!("{}: served from the knowledge base ({})", name, fp.short());
            let trace = vec![TraceStep::new(
                position,
                Rule::KnowledgeBase,
                format!("fingerprint {} is in the knowledge base", fp.short()),
            )];
            return analyzed(name, position, fp, verdict, Vec::new(), trace);
        }

        let no_group = HashSet::new();
        let mut walker = Walker::new(scope, name, params, body, &no_group);
        let cost = walker.block(body);
        let verdict = walker.verdict(&cost);
        debug!("{}: {} from {} / {}", name, verdict, cost.upper, cost.lower);
        self.remember(&fp, &verdict);
        analyzed(name, position, fp, verdict, Vec::new(), walker.trace)
    }

    fn resolve_group(&self, scope: Scope<'_>, ids: &[ProcId]) -> Vec<ProcedureReport> {
        let procs: Vec<&Procedure> = ids.iter().map(|&id| &scope.program.procedures[id]).collect();
        let names: HashSet<String> = procs.iter().map(|p| p.name.clone()).collect();
        let fps: Vec<Fingerprint> = procs
            .iter()
            .map(|p| procedure_fingerprint(p, &|n| scope.callee_ref(n, &p.name, &names)))
            .collect();
        let group_fp = Fingerprint::of_group(&fps);
        let keys: Vec<Fingerprint> = if fps.len() == 1 {
            fps
        } else {
            fps.iter().map(|fp| fp.in_group(&group_fp)).collect()
        };
        let others = |name: &str| -> Vec<String> {
            procs.iter().filter(|q| q.name != name).map(|q| q.name.clone()).collect()
        };

        let hits: Vec<Option<ComplexityVerdict>> = keys.iter().map(|k| self.memoized(k)).collect();
        if hits.iter().all(Option::is_some) {
            debug!("Call group {} served from the knowledge base", group_fp.short());
            return procs
                .iter()
                .zip(keys)
                .zip(hits.into_iter().flatten())
                .map(|((p, key), verdict)| {
                    let trace = vec![TraceStep::new(
                        p.position,
                        Rule::KnowledgeBase,
                        format!("fingerprint {} is in the knowledge base", key.short()),
                    )];
                    analyzed(&p.name, p.position, key, verdict, others(p.name.as_str()), trace)
                })
                .collect();
        }

        let mut traces = Vec::with_capacity(procs.len());
        let mut members = Vec::with_capacity(procs.len());
        let mut failure: Option<UnknownCause> = None;
        let mut provenance = Provenance::Formal;
        let mut confidence = FORMAL_CONFIDENCE;
        for p in &procs {
            let mut walker = Walker::new(scope, &p.name, &p.params, &p.body, &names);
            let cost = walker.block(&p.body);
            if failure.is_none() {
                failure = walker.failure.take();
            }
            let (prov, conf) = walker.provenance();
            if prov == Provenance::Oracle {
                provenance = Provenance::Oracle;
                confidence = confidence.min(conf);
            }
            traces.push(walker.trace);
            members.push(GroupMember {
                procedure: p,
                work_upper: cost.upper,
                work_lower: cost.lower,
            });
        }

        let verdict = match failure {
            Some(cause) => failed_verdict(&cause, confidence),
            None => match recurrence::resolve(&members) {
                Ok(solution) => {
                    info!("Call group {}: {}", group_fp.short(), solution.recurrence);
                    for (p, trace) in procs.iter().zip(traces.iter_mut()) {
                        trace.push(TraceStep::new(
                            p.position,
                            Rule::Recurrence,
                            format!(
                                "{} (upper: {}, lower: {})",
                                solution.recurrence, solution.upper_case, solution.lower_case
                            ),
                        ));
                    }
                    ComplexityVerdict::from_costs(&solution.upper, &solution.lower, provenance, confidence)
                }
                Err(issue) => {
                    info!("Call group {} needs the oracle: {}", group_fp.short(), issue);
                    self.consult_group(&procs, &group_fp, &issue.to_string(), &mut traces)
                }
            },
        };

        procs
            .iter()
            .zip(keys)
            .zip(traces)
            .map(|((p, key), trace)| {
                self.remember(&key, &verdict);
                analyzed(&p.name, p.position, key, verdict.clone(), others(p.name.as_str()), trace)
            })
            .collect()
    }

    fn consult_group(
        &self,
        procs: &[&Procedure],
        group_fp: &Fingerprint,
        reason: &str,
        traces: &mut [Vec<TraceStep>],
    ) -> ComplexityVerdict {
        let description: Vec<String> = procs.iter().map(|p| render_procedure(p)).collect();
        let names: Vec<&str> = procs.iter().map(|p| p.name.as_str()).collect();
        let request = OracleRequest::new(group_fp.clone(), RequestKind::CallGroup, description.join("\n"), reason)
            .with_context(format!("recursive call group: {}", names.join(", ")))
            .with_context("input size: the parameters of the first procedure");

        let (verdict, detail) = match self.gateway.classify(&self.kb, &request) {
            Ok(verdict) => {
                let detail = format!("call group {}: {}", group_fp.short(), verdict);
                match (verdict.is_unknown(), &verdict.cause) {
                    (true, Some(cause)) => (failed_verdict(cause, verdict.confidence), detail),
                    _ => (verdict, detail),
                }
            }
            Err(e) => (
                ComplexityVerdict::error(UnknownCause::OracleFailure(e.to_string())),
                format!("call group {}: {}", group_fp.short(), e),
            ),
        };
        let rule = if verdict.provenance == Provenance::Memoized {
            Rule::KnowledgeBase
        } else {
            Rule::Oracle
        };
        for (p, trace) in procs.iter().zip(traces.iter_mut()) {
            trace.push(TraceStep::new(p.position, rule, detail.clone()));
        }
        verdict
    }
}

fn analyzed(
    name: &str,
    position: Position,
    fp: Fingerprint,
    verdict: ComplexityVerdict,
    group: Vec<String>,
    trace: Vec<TraceStep>,
) -> ProcedureReport {
    ProcedureReport {
        name: name.to_string(),
        position,
        fingerprint: Some(fp),
        status: ProcedureStatus::Analyzed,
        verdict: Some(verdict),
        group,
        trace,
    }
}
