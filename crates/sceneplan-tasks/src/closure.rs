//! Live-set computation and pruning
//!
//! Every task carries an *outlook*: the set of forms it can still end up
//! with given what is known so far. Consumers place demands on their
//! dependencies according to their own outlook, so a change at one task
//! only ever touches the tasks below it. The engine keeps a work-list
//! ordered by topological rank (consumers first) and processes it to a
//! fixpoint after every request or coverage transition.
//!
//! A task is *decided* once its outlook is a single form and no consumer
//! demands it only tentatively. Decisions never flip while requests stay
//! fixed, which is what the scheduler relies on.

use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::coverage::CoverageClassifier;
use crate::graph::{GraphError, TaskGraph};
use crate::oracle::{OracleError, Validity};
use crate::policy::EnforcementPolicy;
use crate::task::{Coverage, EdgeKind, Form, TaskId};

const PRUNED: u8 = 0b001;
const SCENE: u8 = 0b010;
const REAL: u8 = 0b100;

const ONLY_FALSE: &[bool] = &[false];
const ONLY_TRUE: &[bool] = &[true];
const EITHER: &[bool] = &[false, true];

/// Forms a task may still take
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Outlook(u8);

impl Outlook {
    fn bit(form: Form) -> u8 {
        match form {
            Form::Pruned => PRUNED,
            Form::Scene => SCENE,
            Form::Real => REAL,
        }
    }

    pub fn only(form: Form) -> Self {
        Self(Self::bit(form))
    }

    fn insert(&mut self, form: Form) {
        self.0 |= Self::bit(form);
    }

    pub fn contains(self, form: Form) -> bool {
        self.0 & Self::bit(form) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The form, if only one remains
    pub fn single(self) -> Option<Form> {
        match self.0 {
            PRUNED => Some(Form::Pruned),
            SCENE => Some(Form::Scene),
            REAL => Some(Form::Real),
            _ => None,
        }
    }

    pub fn forms(self) -> Vec<Form> {
        [Form::Scene, Form::Real, Form::Pruned]
            .into_iter()
            .filter(|f| self.contains(*f))
            .collect()
    }
}

impl fmt::Debug for Outlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Outlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.forms().iter().map(Form::as_str).collect();
        write!(f, "{{{}}}", names.join("|"))
    }
}

/// Why a task is not executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    /// No live consumer needs it
    NotNeeded,
    /// Needed but not covered, and enforcement forbids the Real form
    Enforcement,
}

impl fmt::Display for PruneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotNeeded => "not needed",
            Self::Enforcement => "not permitted by enforcement",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emission {
    None,
    Tentative,
    Firm,
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Normal,
    Scene,
    Hard,
}

impl From<EdgeKind> for Channel {
    fn from(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::Normal => Self::Normal,
            EdgeKind::Hard => Self::Hard,
        }
    }
}

fn emission(outlook: Outlook, channel: Channel) -> Emission {
    let (firm, possible) = match channel {
        Channel::Normal => (
            outlook.single() == Some(Form::Real),
            outlook.contains(Form::Real),
        ),
        Channel::Scene => (
            outlook.single() == Some(Form::Scene),
            outlook.contains(Form::Scene),
        ),
        // Any live form needs the upstream side effects
        Channel::Hard => (
            !outlook.is_empty() && !outlook.contains(Form::Pruned),
            !outlook.is_empty() && outlook.single() != Some(Form::Pruned),
        ),
    };
    if firm {
        Emission::Firm
    } else if possible {
        Emission::Tentative
    } else {
        Emission::None
    }
}

#[derive(Debug, Clone, Default)]
struct Demand {
    requested: bool,
    firm_normal: usize,
    tentative_normal: usize,
    firm_hard: usize,
    tentative_hard: usize,
}

impl Demand {
    fn counter(&mut self, channel: Channel, emission: Emission) -> Option<&mut usize> {
        match (channel, emission) {
            (_, Emission::None) => None,
            (Channel::Hard, Emission::Firm) => Some(&mut self.firm_hard),
            (Channel::Hard, Emission::Tentative) => Some(&mut self.tentative_hard),
            (_, Emission::Firm) => Some(&mut self.firm_normal),
            (_, Emission::Tentative) => Some(&mut self.tentative_normal),
        }
    }

    fn clear_counts(&mut self) {
        *self = Self {
            requested: self.requested,
            ..Self::default()
        };
    }

    fn is_firm(&self) -> bool {
        self.requested || self.firm_normal > 0 || self.firm_hard > 0
    }

    fn has_tentative(&self) -> bool {
        self.tentative_normal > 0 || self.tentative_hard > 0
    }
}

/// Final forms of a run, in task id order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet {
    forms: BTreeMap<TaskId, Form>,
    variants: BTreeMap<TaskId, TaskId>,
    undecided: Vec<TaskId>,
}

impl LiveSet {
    /// Form of a task, if decided
    pub fn form(&self, id: &TaskId) -> Option<Form> {
        self.forms.get(id).copied()
    }

    /// Whether the task executes in Scene or Real form
    pub fn is_live(&self, id: &TaskId) -> bool {
        self.form(id).is_some_and(|f| f.is_live())
    }

    /// All decided tasks and their forms
    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, Form)> {
        self.forms.iter().map(|(id, form)| (id, *form))
    }

    /// Tasks decided with the given form
    pub fn with_form(&self, form: Form) -> Vec<&TaskId> {
        self.iter()
            .filter(|(_, f)| *f == form)
            .map(|(id, _)| id)
            .collect()
    }

    /// Names of the tasks that execute, Scene tasks by their variant id, sorted
    pub fn executed(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .iter()
            .filter(|(_, form)| form.is_live())
            .map(|(id, form)| match (form, self.variants.get(id)) {
                (Form::Scene, Some(variant)) => variant.to_string(),
                _ => id.to_string(),
            })
            .collect();
        names.sort();
        names
    }

    /// Tasks whose form could not be decided
    pub fn undecided(&self) -> &[TaskId] {
        &self.undecided
    }

    /// Whether every task is decided
    pub fn is_complete(&self) -> bool {
        self.undecided.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.forms.values().filter(|f| f.is_live()).count()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

/// Incrementally maintained closure of the requested tasks
#[derive(Debug, Clone)]
pub struct ClosureEngine {
    graph: Arc<TaskGraph>,
    policy: EnforcementPolicy,
    classifier: CoverageClassifier,
    permitted: Vec<bool>,
    demand: Vec<Demand>,
    outlook: Vec<Outlook>,
    decided: Vec<bool>,
    queue: BinaryHeap<(usize, usize)>,
    queued: Vec<bool>,
    query_candidates: Vec<usize>,
}

impl ClosureEngine {
    pub fn new(graph: Arc<TaskGraph>, policy: EnforcementPolicy) -> Self {
        let n = graph.len();
        let permitted = graph
            .nodes()
            .iter()
            .map(|node| policy.permits_real(&node.id))
            .collect();
        let mut engine = Self {
            classifier: CoverageClassifier::new(&graph),
            graph,
            policy,
            permitted,
            demand: vec![Demand::default(); n],
            outlook: vec![Outlook::only(Form::Pruned); n],
            decided: vec![false; n],
            queue: BinaryHeap::with_capacity(n),
            queued: vec![false; n],
            query_candidates: Vec::new(),
        };
        for i in 0..n {
            engine.enqueue(i);
        }
        engine
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    pub fn policy(&self) -> &EnforcementPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &CoverageClassifier {
        &self.classifier
    }

    /// Add a requested task
    pub fn request(&mut self, id: &TaskId) -> Result<(), GraphError> {
        let index = self
            .graph
            .index_of(id)
            .ok_or_else(|| GraphError::TaskNotFound(id.to_string()))?;
        self.request_index(index);
        Ok(())
    }

    pub fn request_index(&mut self, index: usize) {
        if !self.demand[index].requested {
            self.demand[index].requested = true;
            self.enqueue(index);
        }
    }

    pub fn is_requested(&self, index: usize) -> bool {
        self.demand[index].requested
    }

    /// Requested task ids, in topological order
    pub fn requested(&self) -> Vec<TaskId> {
        self.graph
            .sorted()
            .iter()
            .filter(|&&i| self.demand[i].requested)
            .map(|&i| self.graph.node(i).id.clone())
            .collect()
    }

    /// Apply an oracle answer; call [`settle`](Self::settle) afterwards
    pub fn resolve(
        &mut self,
        index: usize,
        result: Result<Validity, &OracleError>,
    ) -> Option<Coverage> {
        let transition = self.classifier.resolve(&self.graph, index, result);
        if transition.is_some() {
            self.enqueue(index);
        }
        transition
    }

    /// Process the work-list to a fixpoint.
    ///
    /// Returns the tasks that became decided, consumers before their
    /// dependencies.
    pub fn settle(&mut self) -> Vec<usize> {
        let mut newly_decided = Vec::new();
        let mut processed = 0usize;
        while let Some((_, i)) = self.queue.pop() {
            self.queued[i] = false;
            self.process(i, &mut newly_decided);
            processed += 1;
        }
        if processed > 0 {
            trace!(processed, decided = newly_decided.len(), "closure settled");
        }
        newly_decided
    }

    /// Coverable tasks whose coverage now matters; each is returned once
    pub fn take_queries(&mut self) -> Vec<usize> {
        let candidates = std::mem::take(&mut self.query_candidates);
        candidates
            .into_iter()
            .filter(|&i| self.outlook[i].contains(Form::Scene) && self.classifier.mark_queried(i))
            .collect()
    }

    /// Rebuild every outlook from scratch and settle
    pub fn recompute(&mut self) -> Vec<usize> {
        for demand in &mut self.demand {
            demand.clear_counts();
        }
        self.outlook.fill(Outlook::only(Form::Pruned));
        self.decided.fill(false);
        self.query_candidates.clear();
        for i in 0..self.graph.len() {
            self.enqueue(i);
        }
        self.settle()
    }

    pub fn outlook(&self, index: usize) -> Outlook {
        self.outlook[index]
    }

    /// Decided form of a task
    pub fn form(&self, index: usize) -> Option<Form> {
        if self.decided[index] {
            self.outlook[index].single()
        } else {
            None
        }
    }

    pub fn coverage(&self, index: usize) -> Option<Coverage> {
        self.classifier.state(index)
    }

    /// Why a decided task is pruned
    pub fn prune_reason(&self, index: usize) -> Option<PruneReason> {
        match self.form(index) {
            Some(Form::Pruned) if self.demand[index].is_firm() => Some(PruneReason::Enforcement),
            Some(Form::Pruned) => Some(PruneReason::NotNeeded),
            _ => None,
        }
    }

    /// Whether every task is decided and no work is queued
    pub fn is_settled(&self) -> bool {
        self.queue.is_empty() && self.decided.iter().all(|d| *d)
    }

    /// Snapshot of the decided forms
    pub fn live_set(&self) -> LiveSet {
        let mut live = LiveSet::default();
        for &i in self.graph.sorted() {
            let node = self.graph.node(i);
            match self.form(i) {
                Some(form) => {
                    if form == Form::Scene {
                        live.variants
                            .insert(node.id.clone(), node.executed_name(Form::Scene));
                    }
                    live.forms.insert(node.id.clone(), form);
                }
                None => live.undecided.push(node.id.clone()),
            }
        }
        live
    }

    fn enqueue(&mut self, index: usize) {
        if !self.queued[index] {
            self.queued[index] = true;
            self.queue.push((self.graph.rank(index), index));
        }
    }

    fn process(&mut self, i: usize, newly_decided: &mut Vec<usize>) {
        let old = self.outlook[i];
        let new = self.compute_outlook(i);

        if new != old {
            trace!(task = %self.graph.node(i).id, from = %old, to = %new, "outlook narrowed");
            self.outlook[i] = new;

            let graph = Arc::clone(&self.graph);
            for &(dep, kind) in graph.dependencies(i) {
                self.propagate(dep, Channel::from(kind), old, new);
            }
            for &dep in graph.scene_dependencies(i) {
                self.propagate(dep, Channel::Scene, old, new);
            }

            if new.contains(Form::Scene) && self.classifier.needs_query(i) {
                self.query_candidates.push(i);
            }
        }

        // A live single form is final; a pruned one may still change reason
        let now_decided = match new.single() {
            Some(Form::Pruned) => !self.demand[i].has_tentative(),
            Some(_) => true,
            None => false,
        };
        if now_decided != self.decided[i] {
            self.decided[i] = now_decided;
            if now_decided {
                self.log_decision(i);
                newly_decided.push(i);
            }
        }
    }

    fn propagate(&mut self, dep: usize, channel: Channel, old: Outlook, new: Outlook) {
        let before = emission(old, channel);
        let after = emission(new, channel);
        if before == after {
            return;
        }
        let demand = &mut self.demand[dep];
        if let Some(count) = demand.counter(channel, before) {
            *count = count.saturating_sub(1);
        }
        if let Some(count) = demand.counter(channel, after) {
            *count += 1;
        }
        self.enqueue(dep);
    }

    fn compute_outlook(&self, i: usize) -> Outlook {
        let demand = &self.demand[i];

        let demanded = if demand.is_firm() {
            ONLY_TRUE
        } else if demand.has_tentative() {
            EITHER
        } else {
            ONLY_FALSE
        };
        let hard = if demand.firm_hard > 0 {
            ONLY_TRUE
        } else if demand.tentative_hard > 0 {
            EITHER
        } else {
            ONLY_FALSE
        };
        let covered = match self.classifier.state(i) {
            None | Some(Coverage::NotCovered) => ONLY_FALSE,
            Some(Coverage::Covered) => ONLY_TRUE,
            Some(Coverage::Unknown) => EITHER,
        };

        let mut outlook = Outlook::default();
        for &is_demanded in demanded {
            for &is_hard in hard {
                // A hard demand is always a demand
                if is_hard && !is_demanded {
                    continue;
                }
                for &is_covered in covered {
                    outlook.insert(self.decide(i, is_demanded, is_hard, is_covered));
                }
            }
        }
        outlook
    }

    fn decide(&self, i: usize, demanded: bool, hard: bool, covered: bool) -> Form {
        if !demanded {
            Form::Pruned
        } else if hard {
            Form::Real
        } else if covered {
            Form::Scene
        } else if self.demand[i].requested || self.permitted[i] {
            Form::Real
        } else {
            Form::Pruned
        }
    }

    fn log_decision(&self, i: usize) {
        let id = &self.graph.node(i).id;
        let demand = &self.demand[i];
        match self.outlook[i].single() {
            Some(Form::Real) if demand.requested && demand.firm_hard == 0 && !self.permitted[i] => {
                info!(task = %id, "requested task runs real outside the enforcement allow-list");
            }
            Some(Form::Pruned) if demand.is_firm() => {
                info!(task = %id, "task pruned by enforcement");
            }
            Some(form) => debug!(task = %id, form = %form, "form decided"),
            None => {}
        }
    }
}
