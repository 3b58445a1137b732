//! The rebase engine: one replica of a collaboratively edited document.
//!
//! Local transactions are dispatched through [`Replica::dispatch`], which
//! annotates them and keeps them pending until the relay echoes them back.
//! Remote batches go through [`Replica::receive`]: pending mutations are
//! undone, the batch is applied, and whatever is still pending is replayed
//! on top, all in a single transaction for the editor.

use crate::config::ReplicaConfig;
use crate::context::ReplicaContext;
use crate::error::{Result, SyncError};
use crate::messages::WelcomeMessage;
use crate::mutation::Mutation;
use crate::translate::Translator;
use crate::undo::Undo;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, error};
use weft_core::{Bind, BunchMeta, Formatting, Order, Outline};
use weft_doc::{Document, EditorState, Marks, Selection, Transaction};

/// A local mutation that has not been confirmed by the relay yet.
#[derive(Clone, Debug)]
pub struct PendingMutation {
    pub mutation: Mutation,
    pub undo: Undo,
}

pub struct Replica {
    config: ReplicaConfig,
    ctx: ReplicaContext,
    outline: Outline,
    formatting: Formatting,
    state: EditorState,
    pending: VecDeque<PendingMutation>,
    /// Next counter per client, over every confirmed mutation seen.
    client_counters: BTreeMap<String, u64>,
}

impl Replica {
    /// Start a replica on `doc`. Every replica started on the same document
    /// shares its initial positions.
    pub fn new(config: ReplicaConfig, doc: Document) -> Result<Self> {
        let order = Order::new(config.client_id.clone());
        let outline = Outline::with_initial(order, doc.structural_size())?;
        Ok(Self {
            ctx: ReplicaContext::new(config.client_id.clone()),
            config,
            outline,
            formatting: Formatting::new(),
            state: EditorState::new(doc),
            pending: VecDeque::new(),
            client_counters: BTreeMap::new(),
        })
    }

    /// Join a session from a relay's welcome message.
    pub fn from_welcome(config: ReplicaConfig, welcome: &WelcomeMessage) -> Result<Self> {
        let mut order = Order::new(config.client_id.clone());
        order.load(&welcome.order)?;
        let mut outline = Outline::new(order);
        outline.load(&welcome.outline)?;
        let mut formatting = Formatting::new();
        formatting.load(outline.order(), &welcome.formatting)?;

        let mut ctx = ReplicaContext::new(config.client_id.clone());
        ctx.observe(formatting.max_timestamp());

        let mut replica = Self {
            config,
            ctx,
            outline,
            formatting,
            state: EditorState::new(welcome.doc.clone()),
            pending: VecDeque::new(),
            client_counters: welcome.client_counters.clone(),
        };
        if !welcome.mutations.is_empty() {
            replica.receive(&welcome.mutations)?;
        }
        // A client rejoining under its old id continues after its confirmed mutations.
        if let Some(&next) = replica.client_counters.get(&replica.ctx.client_id) {
            replica.ctx.client_counter = replica.ctx.client_counter.max(next);
        }
        debug!(
            client_id = %replica.ctx.client_id,
            bunches = replica.outline.order().bunch_count(),
            mutations = welcome.mutations.len(),
            "Joined from welcome"
        );
        Ok(replica)
    }

    /// A welcome message describing this replica's state.
    ///
    /// Only a replica without pending mutations can describe confirmed state.
    pub fn snapshot(&self) -> Result<WelcomeMessage> {
        if !self.pending.is_empty() {
            return Err(SyncError::PendingMutations(self.pending.len()));
        }
        Ok(WelcomeMessage {
            order: self.outline.order().snapshot(),
            outline: self.outline.snapshot(),
            formatting: self.formatting.snapshot(),
            doc: self.state.doc().clone(),
            mutations: Vec::new(),
            client_counters: self.client_counters.clone(),
        })
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.ctx.client_id
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn doc(&self) -> &Document {
        self.state.doc()
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    pub fn formatting(&self) -> &Formatting {
        &self.formatting
    }

    pub fn context(&self) -> &ReplicaContext {
        &self.ctx
    }

    /// Unconfirmed local mutations, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &Mutation> {
        self.pending.iter().map(|p| &p.mutation)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Marks that text typed at `pos` should carry, per the configured expand rules.
    pub fn stored_marks(&self, pos: usize) -> Result<Marks> {
        Ok(self
            .formatting
            .inherited_format(&self.outline, pos, &self.config.expand_rules)?)
    }

    /// Apply a local transaction and return the mutation to send, if it changed the document.
    ///
    /// `tr` must have been started from the current state.
    pub fn dispatch(&mut self, tr: Transaction) -> Result<Option<Mutation>> {
        if tr.before() != self.state.doc() {
            return Err(SyncError::StaleTransaction);
        }
        if !tr.doc_changed() {
            self.state = self.state.apply(&tr);
            return Ok(None);
        }

        let (ann_steps, undo) =
            Translator::new(&mut self.outline, &mut self.formatting, &mut self.ctx, &self.config)
                .translate(&tr)?;
        self.state = self.state.apply(&tr);

        let mutation = Mutation {
            client_id: self.ctx.client_id.clone(),
            client_counter: self.ctx.next_counter(),
            ann_steps,
        };
        debug!(
            client_id = %mutation.client_id,
            client_counter = mutation.client_counter,
            steps = mutation.ann_steps.len(),
            pending = self.pending.len() + 1,
            "Dispatched local mutation"
        );
        self.pending.push_back(PendingMutation {
            mutation: mutation.clone(),
            undo,
        });
        Ok(Some(mutation))
    }

    /// Rebase pending mutations over a batch of confirmed mutations.
    ///
    /// Returns the transaction applied to the editor, or `None` when the batch
    /// only confirmed pending mutations. A batch referencing bunches this
    /// replica has never seen is rejected before any state changes.
    pub fn receive(&mut self, mutations: &[Mutation]) -> Result<Option<Transaction>> {
        self.register_metas(mutations)?;
        for mutation in mutations {
            let next = self.client_counters.entry(mutation.client_id.clone()).or_default();
            *next = (*next).max(mutation.client_counter + 1);
        }

        // Confirmed prefix of our own pending mutations: nothing to rebase.
        let mut matched = 0;
        while matched < mutations.len() {
            match self.pending.front() {
                Some(p) if p.mutation.same_id(&mutations[matched]) => {
                    self.pending.pop_front();
                    matched += 1;
                }
                _ => break,
            }
        }
        let remote = &mutations[matched..];
        if remote.is_empty() {
            return Ok(None);
        }

        let mut tr = self.state.tr();
        let selection = self.state.selection();
        let anchor = self.outline.cursor_at(selection.anchor, Bind::Left)?;
        let head = self.outline.cursor_at(selection.head, Bind::Left)?;

        for p in self.pending.iter().rev() {
            p.undo.apply(&mut tr, &mut self.outline, &mut self.formatting)?;
        }

        for mutation in remote {
            Translator::new(&mut self.outline, &mut self.formatting, &mut self.ctx, &self.config)
                .apply(mutation, &mut tr)?;
            // An echo of ours is confirmed now, wherever it sits in the queue.
            if let Some(index) = self.pending.iter().position(|p| p.mutation.same_id(mutation)) {
                self.pending.remove(index);
            }
        }

        let mut replayed = VecDeque::with_capacity(self.pending.len());
        while let Some(mut p) = self.pending.pop_front() {
            let undo = Translator::new(&mut self.outline, &mut self.formatting, &mut self.ctx, &self.config)
                .apply(&p.mutation, &mut tr);
            match undo {
                Ok(undo) => {
                    p.undo = undo;
                    replayed.push_back(p);
                }
                Err(err) => {
                    replayed.push_back(p);
                    replayed.append(&mut self.pending);
                    self.pending = replayed;
                    return Err(err);
                }
            }
        }
        self.pending = replayed;

        let selection = Selection::new(
            self.outline.index_of_cursor(&anchor, Bind::Left)?,
            self.outline.index_of_cursor(&head, Bind::Left)?,
        );
        tr.set_selection(selection.clamp(tr.doc()));
        tr.set_add_to_history(false);
        self.state = self.state.apply(&tr);

        debug!(
            client_id = %self.ctx.client_id,
            confirmed = matched,
            remote = remote.len(),
            replayed = self.pending.len(),
            "Rebased pending mutations"
        );
        Ok(Some(tr))
    }

    /// Register the bunches a batch creates. Every parent and every referenced
    /// bunch must be known already or arrive in the same batch.
    fn register_metas(&mut self, mutations: &[Mutation]) -> Result<()> {
        let metas: Vec<BunchMeta> = mutations
            .iter()
            .flat_map(|m| m.ann_steps.iter())
            .flat_map(|s| s.metas().cloned())
            .collect();
        let incoming: HashSet<&str> = metas.iter().map(|m| m.bunch_id.as_str()).collect();
        let order = self.outline.order();
        let known = |bunch_id: &str| order.is_known(bunch_id) || incoming.contains(bunch_id);

        let referenced = metas.iter().map(|m| m.parent_id.as_str()).chain(
            mutations
                .iter()
                .flat_map(|m| m.ann_steps.iter())
                .flat_map(|s| s.positions())
                .map(|p| p.bunch_id.as_str()),
        );
        for bunch_id in referenced {
            if !known(bunch_id) {
                error!(client_id = %self.ctx.client_id, bunch_id, "Mutation references unknown bunch");
                return Err(SyncError::MissingDependency(bunch_id.to_string()));
            }
        }

        self.outline.order_mut().add_metas(&metas)?;
        Ok(())
    }
}
