//! Step translator - integer-position steps <-> position-referenced steps.
//!
//! Local direction: [`Translator::translate`] walks a dispatched transaction,
//! emits one [`AnnotatedStep`] per step and keeps the outline in lockstep
//! with the document. Remote direction: [`Translator::apply`] re-resolves
//! each annotated step against the current outline, applies the resulting
//! step to a transaction and updates the outline the same way.
//!
//! Both directions record an [`Undo`] that reverts their document, outline
//! and formatting changes.

use crate::config::ReplicaConfig;
use crate::context::ReplicaContext;
use crate::error::Result;
use crate::mutation::{AnnotatedStep, DeletePositions, InsertPositions, MarkPayload, Mutation, ReplacePositions};
use crate::undo::{Undo, UndoEntry};
use serde_json::Value;
use tracing::{debug, error, warn};
use weft_core::{Bind, Formatting, Outline, SearchDir};
use weft_doc::{Document, Step, Transaction};

/// Which side of a replaced range newly allocated positions lean towards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bias {
    Left,
    Right,
}

pub struct Translator<'a> {
    outline: &'a mut Outline,
    formatting: &'a mut Formatting,
    ctx: &'a mut ReplicaContext,
    config: &'a ReplicaConfig,
}

impl<'a> Translator<'a> {
    pub fn new(
        outline: &'a mut Outline,
        formatting: &'a mut Formatting,
        ctx: &'a mut ReplicaContext,
        config: &'a ReplicaConfig,
    ) -> Self {
        Self {
            outline,
            formatting,
            ctx,
            config,
        }
    }

    /// Annotate the steps of a local transaction that has already been
    /// applied to the editor, updating the outline and formatting store.
    pub fn translate(&mut self, tr: &Transaction) -> Result<(Vec<AnnotatedStep>, Undo)> {
        let mut ann_steps = Vec::with_capacity(tr.steps().len());
        let mut undo = Undo::new();
        let mut reported = false;

        for (i, step) in tr.steps().iter().enumerate() {
            undo.doc_steps.push(step.invert(&tr.docs()[i]));

            match step {
                Step::Replace {
                    from,
                    to,
                    slice,
                    structure,
                } => {
                    if from == to && slice.is_empty() {
                        warn!(pos = from, "Skipping trivial replace step");
                        continue;
                    }
                    let positions = self.to_replace_positions(*from, *to, slice.size(), Bias::Left)?;
                    self.apply_replace_positions(&positions, *from, *to, slice.size(), &mut undo)?;
                    ann_steps.push(AnnotatedStep::Replace {
                        positions,
                        slice: slice.clone(),
                        structure: *structure,
                    });
                }
                Step::ReplaceAround {
                    from,
                    to,
                    gap_from,
                    gap_to,
                    slice,
                    insert,
                    structure,
                } => {
                    let after_insert = slice.size() - insert;
                    let left_positions = self.to_replace_positions(*from, *gap_from, *insert, Bias::Left)?;
                    let right_positions = self.to_replace_positions(*gap_to, *to, after_insert, Bias::Right)?;
                    // Later indices first, so the left side's indices stay valid.
                    self.apply_replace_positions(&right_positions, *gap_to, *to, after_insert, &mut undo)?;
                    self.apply_replace_positions(&left_positions, *from, *gap_from, *insert, &mut undo)?;
                    ann_steps.push(AnnotatedStep::ReplaceAround {
                        left_positions,
                        right_positions,
                        slice: slice.clone(),
                        slice_insert: *insert,
                        structure: *structure,
                    });
                }
                Step::AddMark { from, to, key, value } => {
                    let ann = self.local_mark(*from, *to, key, value.clone(), true, &mut undo)?;
                    ann_steps.push(ann);
                }
                Step::RemoveMark { from, to, key } => {
                    let ann = self.local_mark(*from, *to, key, Value::Null, false, &mut undo)?;
                    ann_steps.push(ann);
                }
                Step::AddNodeMark { pos, key, value } => ann_steps.push(AnnotatedStep::ChangeNodeMark {
                    is_add: true,
                    pos: self.outline.position_at(*pos)?,
                    key: key.clone(),
                    value: value.clone(),
                }),
                Step::RemoveNodeMark { pos, key } => ann_steps.push(AnnotatedStep::ChangeNodeMark {
                    is_add: false,
                    pos: self.outline.position_at(*pos)?,
                    key: key.clone(),
                    value: Value::Null,
                }),
                Step::Attr { pos, attr, value } => ann_steps.push(AnnotatedStep::Attr {
                    pos: self.outline.position_at(*pos)?,
                    attr: attr.clone(),
                    value: value.clone(),
                }),
                Step::DocAttr { attr, value } => ann_steps.push(AnnotatedStep::DocAttr {
                    attr: attr.clone(),
                    value: value.clone(),
                }),
            }

            let counter = self.ctx.client_counter;
            let client_id = self.ctx.client_id.clone();
            self.report_parity(tr.doc_after(i), &client_id, counter, &mut reported);
        }

        Ok((ann_steps, undo))
    }

    fn local_mark(
        &mut self,
        from: usize,
        to: usize,
        key: &str,
        value: Value,
        is_add: bool,
        undo: &mut Undo,
    ) -> Result<AnnotatedStep> {
        let expand = self.config.expand_rules.rule(key, is_add);
        let (start, end) = Formatting::anchors_for(self.outline, from, to, expand)?;
        let (from_pos, to_pos) = (start.pos, end.pos);
        let mark = MarkPayload {
            key: key.to_string(),
            value,
            creator_id: self.ctx.client_id.clone(),
            timestamp: self.ctx.tick(),
            expand,
        };
        let formatting_mark = mark.to_mark(&from_pos, &to_pos);
        undo.entries.push(UndoEntry::RevertMark(formatting_mark.id()));
        self.formatting.add_mark_spans(self.outline.order(), formatting_mark)?;
        Ok(AnnotatedStep::ChangeMark {
            is_add,
            from_pos,
            to_pos,
            mark,
        })
    }

    /// Re-resolve `mutation` against the current outline and apply it to `tr`.
    ///
    /// Steps that no longer fit the document are logged and skipped; the
    /// outline only changes for steps that applied.
    pub fn apply(&mut self, mutation: &Mutation, tr: &mut Transaction) -> Result<Undo> {
        let mut undo = Undo::new();
        let mut reported = false;

        for ann in &mutation.ann_steps {
            match ann {
                AnnotatedStep::Replace {
                    positions,
                    slice,
                    structure,
                } => {
                    let Some((from, to)) = self.from_replace_positions(positions)? else {
                        warn!(client_id = %mutation.client_id, "Skipping replace without positions");
                        continue;
                    };
                    let step = Step::Replace {
                        from,
                        to,
                        slice: slice.clone(),
                        structure: *structure,
                    };
                    if try_step(tr, step, mutation, &mut undo) {
                        self.apply_replace_positions(positions, from, to, slice.size(), &mut undo)?;
                    }
                }
                AnnotatedStep::ReplaceAround {
                    left_positions,
                    right_positions,
                    slice,
                    slice_insert,
                    structure,
                } => {
                    let (Some((from, gap_from)), Some((gap_to, to))) = (
                        self.from_replace_positions(left_positions)?,
                        self.from_replace_positions(right_positions)?,
                    ) else {
                        warn!(client_id = %mutation.client_id, "Skipping replaceAround without positions");
                        continue;
                    };
                    let step = Step::ReplaceAround {
                        from,
                        to,
                        gap_from,
                        gap_to,
                        slice: slice.clone(),
                        insert: *slice_insert,
                        structure: *structure,
                    };
                    if try_step(tr, step, mutation, &mut undo) {
                        let after_insert = slice.size().saturating_sub(*slice_insert);
                        self.apply_replace_positions(right_positions, gap_to, to, after_insert, &mut undo)?;
                        self.apply_replace_positions(left_positions, from, gap_from, *slice_insert, &mut undo)?;
                    }
                }
                AnnotatedStep::ChangeMark {
                    is_add,
                    from_pos,
                    to_pos,
                    mark,
                } => {
                    self.ctx.observe(mark.timestamp);
                    let mut payload = mark.clone();
                    if !is_add {
                        payload.value = Value::Null;
                    }
                    let formatting_mark = payload.to_mark(from_pos, to_pos);
                    let id = formatting_mark.id();
                    if self.formatting.contains(&id) {
                        debug!(creator_id = %id.creator_id, timestamp = id.timestamp, "Mark already known");
                        continue;
                    }
                    let spans = self.formatting.add_mark_spans(self.outline.order(), formatting_mark)?;
                    undo.entries.push(UndoEntry::RevertMark(id));

                    // The document follows the LWW winner on every span this mark won.
                    let size = tr.doc().content_size();
                    for span in spans {
                        let from = self.outline.index_of_anchor(&span.start)?.min(size);
                        let to = self.outline.index_of_anchor(&span.end)?.min(size);
                        if from >= to {
                            continue;
                        }
                        let step = if span.value.is_null() {
                            Step::RemoveMark {
                                from,
                                to,
                                key: span.key,
                            }
                        } else {
                            Step::AddMark {
                                from,
                                to,
                                key: span.key,
                                value: span.value,
                            }
                        };
                        try_step(tr, step, mutation, &mut undo);
                    }
                }
                AnnotatedStep::ChangeNodeMark {
                    is_add,
                    pos,
                    key,
                    value,
                } => {
                    let Some(index) = self.outline.index_of_position(pos, SearchDir::None)? else {
                        debug!(pos = %pos, "Node for node mark was deleted");
                        continue;
                    };
                    let step = if *is_add {
                        Step::AddNodeMark {
                            pos: index,
                            key: key.clone(),
                            value: value.clone(),
                        }
                    } else {
                        Step::RemoveNodeMark {
                            pos: index,
                            key: key.clone(),
                        }
                    };
                    try_step(tr, step, mutation, &mut undo);
                }
                AnnotatedStep::Attr { pos, attr, value } => {
                    let Some(index) = self.outline.index_of_position(pos, SearchDir::None)? else {
                        debug!(pos = %pos, "Node for attr was deleted");
                        continue;
                    };
                    let step = Step::Attr {
                        pos: index,
                        attr: attr.clone(),
                        value: value.clone(),
                    };
                    try_step(tr, step, mutation, &mut undo);
                }
                AnnotatedStep::DocAttr { attr, value } => {
                    let step = Step::DocAttr {
                        attr: attr.clone(),
                        value: value.clone(),
                    };
                    try_step(tr, step, mutation, &mut undo);
                }
            }

            self.report_parity(tr.doc(), &mutation.client_id, mutation.client_counter, &mut reported);
        }

        Ok(undo)
    }

    /// Positions for a replace of `from..to` inserting `count` tokens.
    ///
    /// Inserted positions are allocated and immediately deleted again, so the
    /// outline is unchanged until [`Self::apply_replace_positions`].
    fn to_replace_positions(&mut self, from: usize, to: usize, count: usize, bias: Bias) -> Result<ReplacePositions> {
        let mut positions = ReplacePositions::default();

        if count > 0 {
            let index = if from == to {
                from
            } else if to - from >= 2 {
                // Inside the deleted range, so the resolved range always contains it.
                match bias {
                    Bias::Left => from + 1,
                    Bias::Right => to - 1,
                }
            } else {
                // Stretching the resolved range to reach the insertion
                // then grows it towards the bias.
                match bias {
                    Bias::Left => from,
                    Bias::Right => to,
                }
            };
            let (start_pos, meta) = self.outline.insert_at(index, count)?;
            self.outline.delete(&start_pos, count)?;
            positions.insert = Some(InsertPositions { meta, start_pos });
        }

        // An empty side of a replace-around still needs a location: an
        // empty delete record resolves back to it.
        if to > from || count == 0 {
            positions.delete = Some(DeletePositions {
                start_pos: self.outline.cursor_at(from, Bind::Right)?,
                end_pos: self.outline.cursor_at(to, Bind::Left)?,
            });
        }

        Ok(positions)
    }

    /// The current `from..to` range for `positions`, registering any carried metadata.
    fn from_replace_positions(&mut self, positions: &ReplacePositions) -> Result<Option<(usize, usize)>> {
        if let Some(meta) = positions.insert.as_ref().and_then(|i| i.meta.as_ref()) {
            self.outline.order_mut().add_metas(std::slice::from_ref(meta))?;
        }

        match (&positions.insert, &positions.delete) {
            (insert, Some(delete)) => {
                let mut from = self.outline.index_of_cursor(&delete.start_pos, Bind::Right)?;
                let mut to = self.outline.index_of_cursor(&delete.end_pos, Bind::Left)?;
                if to < from {
                    from = to;
                }
                if let Some(insert) = insert {
                    // Stretch the range so it contains the insertion point.
                    let index = self.outline.insertion_index(&insert.start_pos)?;
                    from = from.min(index);
                    to = to.max(index);
                }
                Ok(Some((from, to)))
            }
            (Some(insert), None) => {
                let index = self.outline.insertion_index(&insert.start_pos)?;
                Ok(Some((index, index)))
            }
            (None, None) => Ok(None),
        }
    }

    /// Mirror an applied replace of `from..to` with `count` inserted tokens in the outline.
    fn apply_replace_positions(
        &mut self,
        positions: &ReplacePositions,
        from: usize,
        to: usize,
        count: usize,
        undo: &mut Undo,
    ) -> Result<()> {
        let deleted = self.outline.delete_at(from, to - from)?;
        if !deleted.is_empty() {
            undo.entries.push(UndoEntry::RestoreDeleted(deleted));
        }
        if let Some(insert) = &positions.insert {
            if count > 0 {
                self.outline.add(&insert.start_pos, count)?;
                undo.entries.push(UndoEntry::RemoveInserted {
                    start: insert.start_pos.clone(),
                    count,
                });
            }
        }
        Ok(())
    }

    fn report_parity(&self, doc: &Document, client_id: &str, client_counter: u64, reported: &mut bool) {
        if !self.config.check_parity || *reported {
            return;
        }
        if self.outline.len() != doc.structural_size() {
            *reported = true;
            error!(
                client_id,
                client_counter,
                outline_len = self.outline.len(),
                doc_size = doc.structural_size(),
                "Outline length no longer matches document"
            );
        }
    }
}

/// Apply `step`, recording its inverse. Failures are logged and skipped.
fn try_step(tr: &mut Transaction, step: Step, mutation: &Mutation, undo: &mut Undo) -> bool {
    match tr.step(step.clone()) {
        Ok(()) => {
            if let Some(before) = tr.docs().last() {
                undo.doc_steps.push(step.invert(before));
            }
            true
        }
        Err(err) => {
            warn!(
                client_id = %mutation.client_id,
                client_counter = mutation.client_counter,
                step = step.kind(),
                error = %err,
                "Skipping step that no longer applies"
            );
            false
        }
    }
}
