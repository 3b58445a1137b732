//! Formatting - last-writer-wins marks layered over [`Position`]s.
//!
//! A mark covers every position strictly between its start and end
//! [`Anchor`]s. Marks are append-only; for each key the covering mark with
//! the greatest `(timestamp, creator_id)` decides the value, and a `null`
//! value means "unset".

use crate::error::{CoreError, Result};
use crate::order::Order;
use crate::outline::{Bind, Outline};
use crate::position::Position;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// A gap next to a position: just before it (`before = true`) or just after it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub pos: Position,
    pub before: bool,
}

impl Anchor {
    pub fn before(pos: Position) -> Self {
        Self { pos, before: true }
    }

    pub fn after(pos: Position) -> Self {
        Self { pos, before: false }
    }
}

/// Unique identifier for a mark.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkId {
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    pub timestamp: u64,
}

/// A formatting mark that spans a range of positions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub start: Anchor,
    pub end: Anchor,
    pub key: String,
    pub value: Value,
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    /// Lamport timestamp.
    pub timestamp: u64,
}

impl Mark {
    pub fn id(&self) -> MarkId {
        MarkId {
            creator_id: self.creator_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// LWW: later timestamp wins, ties broken by creator id.
    pub fn wins_over(&self, other: &Mark) -> bool {
        (self.timestamp, &self.creator_id) > (other.timestamp, &other.creator_id)
    }
}

/// A span whose value for `key` is now `value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatChange {
    pub start: Anchor,
    pub end: Anchor,
    pub key: String,
    pub value: Value,
    pub previous_value: Value,
}

/// Whether content inserted at a mark's edge joins the mark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expand {
    #[default]
    None,
    Before,
    After,
    Both,
}

impl Expand {
    pub fn expands_before(self) -> bool {
        matches!(self, Expand::Before | Expand::Both)
    }

    pub fn expands_after(self) -> bool {
        matches!(self, Expand::After | Expand::Both)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRule {
    pub on_add: Expand,
    pub on_remove: Expand,
}

/// Per-key expand rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandRules {
    pub default: Expand,
    pub keys: BTreeMap<String, KeyRule>,
}

impl ExpandRules {
    pub fn new(default: Expand) -> Self {
        Self {
            default,
            keys: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, key: impl Into<String>, on_add: Expand, on_remove: Expand) -> Self {
        self.keys.insert(key.into(), KeyRule { on_add, on_remove });
        self
    }

    pub fn rule(&self, key: &str, is_add: bool) -> Expand {
        match self.keys.get(key) {
            Some(rule) if is_add => rule.on_add,
            Some(rule) => rule.on_remove,
            None => self.default,
        }
    }
}

impl Default for ExpandRules {
    /// Inline toggles expand after; block-exclusive keys never expand;
    /// links stop at their edges but unlinking spreads both ways.
    fn default() -> Self {
        let mut rules = Self::new(Expand::After);
        for key in ["block", "header", "list", "indent", "align"] {
            rules = rules.with_rule(key, Expand::None, Expand::None);
        }
        rules.with_rule("link", Expand::None, Expand::Both)
    }
}

/// Saved form of a [`Formatting`] store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattingSnapshot {
    pub marks: Vec<Mark>,
}

/// Append-only LWW mark store.
#[derive(Clone, Debug, Default)]
pub struct Formatting {
    marks: Vec<Mark>,
    ids: HashSet<MarkId>,
}

/// Compare two anchors; equal positions put the `before` gap first.
pub fn compare_anchors(order: &Order, a: &Anchor, b: &Anchor) -> Result<Ordering> {
    Ok(order
        .compare(&a.pos, &b.pos)?
        .then_with(|| b.before.cmp(&a.before)))
}

fn anchor_vs_position(order: &Order, anchor: &Anchor, pos: &Position) -> Result<Ordering> {
    Ok(match order.compare(&anchor.pos, pos)? {
        Ordering::Equal if anchor.before => Ordering::Less,
        Ordering::Equal => Ordering::Greater,
        other => other,
    })
}

impl Formatting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn contains(&self, id: &MarkId) -> bool {
        self.ids.contains(id)
    }

    /// Highest Lamport timestamp seen so far, 0 when empty.
    pub fn max_timestamp(&self) -> u64 {
        self.marks.iter().map(|m| m.timestamp).max().unwrap_or(0)
    }

    fn covers(&self, order: &Order, mark: &Mark, pos: &Position) -> Result<bool> {
        Ok(anchor_vs_position(order, &mark.start, pos)? == Ordering::Less
            && anchor_vs_position(order, &mark.end, pos)? == Ordering::Greater)
    }

    /// Add a mark and return the spans whose effective value changed.
    ///
    /// Re-adding a known mark, or a mark that loses LWW everywhere it lands,
    /// returns nothing.
    pub fn add_mark(&mut self, order: &Order, mark: Mark) -> Result<Vec<FormatChange>> {
        let spans = self.add_mark_spans(order, mark)?;
        let mut changes: Vec<FormatChange> = Vec::new();
        for span in spans.into_iter().filter(|s| s.value != s.previous_value) {
            match changes.last_mut() {
                Some(last) if last.end == span.start && last.previous_value == span.previous_value => {
                    last.end = span.end;
                }
                _ => changes.push(span),
            }
        }
        Ok(changes)
    }

    /// Add a mark and return every span where it is now the winning mark,
    /// whether or not the effective value changed there.
    pub fn add_mark_spans(&mut self, order: &Order, mark: Mark) -> Result<Vec<FormatChange>> {
        if self.ids.contains(&mark.id()) {
            return Ok(Vec::new());
        }
        for anchor in [&mark.start, &mark.end] {
            if !order.contains_position(&anchor.pos) {
                return Err(CoreError::UnknownBunch(anchor.pos.bunch_id.clone()));
            }
        }
        if compare_anchors(order, &mark.start, &mark.end)? != Ordering::Less {
            self.insert(mark);
            return Ok(Vec::new());
        }

        let same_key: Vec<&Mark> = self.marks.iter().filter(|m| m.key == mark.key).collect();

        let mut bounds = vec![mark.start.clone(), mark.end.clone()];
        for other in &same_key {
            for anchor in [&other.start, &other.end] {
                if compare_anchors(order, &mark.start, anchor)? == Ordering::Less
                    && compare_anchors(order, anchor, &mark.end)? == Ordering::Less
                {
                    bounds.push(anchor.clone());
                }
            }
        }
        let mut sort_err = None;
        bounds.sort_by(|a, b| {
            compare_anchors(order, a, b).unwrap_or_else(|e| {
                sort_err.get_or_insert(e);
                Ordering::Equal
            })
        });
        if let Some(err) = sort_err {
            return Err(err);
        }
        bounds.dedup();

        let mut spans = Vec::new();
        for pair in bounds.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let mut winner: Option<&Mark> = None;
            for other in &same_key {
                let inside = compare_anchors(order, &other.start, a)? != Ordering::Greater
                    && compare_anchors(order, b, &other.end)? != Ordering::Greater;
                if inside && winner.map_or(true, |w| other.wins_over(w)) {
                    winner = Some(*other);
                }
            }
            if winner.map_or(true, |w| mark.wins_over(w)) {
                spans.push(FormatChange {
                    start: a.clone(),
                    end: b.clone(),
                    key: mark.key.clone(),
                    value: mark.value.clone(),
                    previous_value: winner.map_or(Value::Null, |w| w.value.clone()),
                });
            }
        }
        self.insert(mark);
        Ok(spans)
    }

    fn insert(&mut self, mark: Mark) {
        self.ids.insert(mark.id());
        self.marks.push(mark);
    }

    /// Remove a mark by id. Used to revert a mark that was added locally.
    pub fn remove_mark(&mut self, id: &MarkId) -> Option<Mark> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.marks.iter().position(|m| &m.id() == id)?;
        Some(self.marks.remove(index))
    }

    /// Effective key/value pairs at `pos`. Unset keys are omitted.
    pub fn get_format(&self, order: &Order, pos: &Position) -> Result<BTreeMap<String, Value>> {
        let mut winners: BTreeMap<&str, &Mark> = BTreeMap::new();
        for mark in &self.marks {
            if !self.covers(order, mark, pos)? {
                continue;
            }
            match winners.get(mark.key.as_str()) {
                Some(current) if !mark.wins_over(current) => {}
                _ => {
                    winners.insert(&mark.key, mark);
                }
            }
        }
        Ok(winners
            .into_iter()
            .filter(|(_, mark)| !mark.value.is_null())
            .map(|(key, mark)| (key.to_string(), mark.value.clone()))
            .collect())
    }

    /// The format that content inserted at gap `index` picks up from its
    /// neighbours under `rules`. The left neighbour takes precedence.
    pub fn inherited_format(
        &self,
        outline: &Outline,
        index: usize,
        rules: &ExpandRules,
    ) -> Result<BTreeMap<String, Value>> {
        let mut format = BTreeMap::new();
        if index > 0 {
            let left = outline.position_at(index - 1)?;
            for (key, value) in self.get_format(outline.order(), &left)? {
                if rules.rule(&key, true).expands_after() {
                    format.insert(key, value);
                }
            }
        }
        if index < outline.len() {
            let right = outline.position_at(index)?;
            for (key, value) in self.get_format(outline.order(), &right)? {
                if rules.rule(&key, true).expands_before() {
                    format.entry(key).or_insert(value);
                }
            }
        }
        Ok(format)
    }

    /// Anchors covering the index range `from..to` under `expand`.
    ///
    /// A non-expanding start sits before the first covered position and a
    /// non-expanding end after the last one; expanding edges move out to the
    /// neighbouring positions so adjacent insertions land inside.
    pub fn anchors_for(
        outline: &Outline,
        from: usize,
        to: usize,
        expand: Expand,
    ) -> Result<(Anchor, Anchor)> {
        if from > to {
            return Err(CoreError::InvalidRange);
        }
        let start = if expand.expands_before() {
            Anchor::after(outline.cursor_at(from, Bind::Left)?)
        } else {
            Anchor::before(outline.cursor_at(from, Bind::Right)?)
        };
        let end = if expand.expands_after() {
            Anchor::before(outline.cursor_at(to, Bind::Right)?)
        } else {
            Anchor::after(outline.cursor_at(to, Bind::Left)?)
        };
        Ok((start, end))
    }

    pub fn snapshot(&self) -> FormattingSnapshot {
        FormattingSnapshot {
            marks: self.marks.clone(),
        }
    }

    /// Add every mark of a saved store. Known marks are skipped.
    pub fn load(&mut self, order: &Order, snapshot: &FormattingSnapshot) -> Result<()> {
        for mark in &snapshot.marks {
            self.add_mark_spans(order, mark.clone())?;
        }
        Ok(())
    }
}
