//! Area filtering of change streams.
//!
//! [`AreaFilter`] classifies each change against an [`Area`] and forwards the
//! matching ones to a downstream [`ChangeSink`]. Nodes match on position,
//! ways on their referenced nodes and relations on their members, so a
//! stream must arrive in node, way, relation order for ways and relations to
//! be recognised.
//!
//! In the complete modes every change is buffered in a per-kind
//! [`RecordStore`](crate::RecordStore) and the decision is deferred until
//! [`ChangeSink::complete`], when referenced entities outside the area can
//! still be pulled in.

use crate::entity::{Change, Entity, EntityId, EntityKind, Node, Relation, Way};
use crate::id_tracker::{IdTracker, IdTrackerType};
use crate::record_store::{RecordStore, RecordStoreError};
use crate::sink::{ChangeSink, Metadata, SinkError};
use crate::{Area, BoundingBox};

mod config;

pub use config::{AreaFilterConfig, Completeness};

/// Area filter selecting changes inside a [`BoundingBox`].
pub type BoundingBoxFilter<S> = AreaFilter<BoundingBox, S>;

type ChangeStore = Box<dyn RecordStore<Change>>;

/// One identifier set per entity kind.
#[derive(Debug)]
struct Trackers {
    nodes: Box<dyn IdTracker>,
    ways: Box<dyn IdTracker>,
    relations: Box<dyn IdTracker>,
}

impl Trackers {
    fn new(kind: IdTrackerType) -> Self {
        Self {
            nodes: kind.create(),
            ways: kind.create(),
            relations: kind.create(),
        }
    }

    fn of(&self, kind: EntityKind) -> &dyn IdTracker {
        match kind {
            EntityKind::Node => self.nodes.as_ref(),
            EntityKind::Way => self.ways.as_ref(),
            EntityKind::Relation => self.relations.as_ref(),
        }
    }

    fn of_mut(&mut self, kind: EntityKind) -> &mut dyn IdTracker {
        match kind {
            EntityKind::Node => self.nodes.as_mut(),
            EntityKind::Way => self.ways.as_mut(),
            EntityKind::Relation => self.relations.as_mut(),
        }
    }

    fn merge(&mut self, other: &Self) {
        self.nodes.set_all(other.nodes.as_ref());
        self.ways.set_all(other.ways.as_ref());
        self.relations.set_all(other.relations.as_ref());
    }
}

#[derive(Debug, Default)]
struct Stores {
    nodes: Option<ChangeStore>,
    ways: Option<ChangeStore>,
    relations: Option<ChangeStore>,
}

impl Stores {
    fn of_mut(&mut self, kind: EntityKind) -> Option<&mut ChangeStore> {
        match kind {
            EntityKind::Node => self.nodes.as_mut(),
            EntityKind::Way => self.ways.as_mut(),
            EntityKind::Relation => self.relations.as_mut(),
        }
    }

    fn release(&mut self) {
        for slot in [&mut self.nodes, &mut self.ways, &mut self.relations] {
            if let Some(mut store) = slot.take() {
                store.release();
            }
        }
    }
}

/// Change sink forwarding the changes that fall inside an area.
///
/// # Examples
///
/// ```
/// use osmfence_core::{AreaFilter, AreaFilterConfig, BoundingBox, Change, ChangeSink, Metadata, Node};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let area = BoundingBox::new(-20.0, 20.0, 20.0, -20.0)?;
/// let mut filter = AreaFilter::new(area, AreaFilterConfig::default(), Vec::new())?;
/// filter.initialize(&Metadata::new())?;
/// filter.process(Change::create(Node::new(1, 1, 10.0, 10.0)))?;
/// filter.process(Change::create(Node::new(2, 1, 30.0, 30.0)))?;
/// filter.complete()?;
/// filter.release();
/// assert_eq!(filter.sink().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AreaFilter<A, S> {
    area: A,
    completeness: Completeness,
    clip: bool,
    available: Trackers,
    required: Option<Trackers>,
    stores: Stores,
    sink: S,
    released: bool,
}

impl<A: Area, S: ChangeSink> AreaFilter<A, S> {
    /// Build a filter in front of `sink`.
    ///
    /// Record stores are allocated here for the buffered modes. If that
    /// fails, whatever was allocated is released together with `sink`.
    ///
    /// # Errors
    /// Returns [`RecordStoreError`] when a record store cannot be created.
    pub fn new(area: A, config: AreaFilterConfig, sink: S) -> Result<Self, RecordStoreError> {
        Self::with_stores(area, config, sink, |label| config.record_store.create(label))
    }

    /// Build a filter whose record stores come from `create`.
    pub(crate) fn with_stores<F>(
        area: A,
        config: AreaFilterConfig,
        sink: S,
        create: F,
    ) -> Result<Self, RecordStoreError>
    where
        F: FnMut(&'static str) -> Result<ChangeStore, RecordStoreError>,
    {
        let completeness = config.completeness();
        let mut filter = Self {
            area,
            completeness,
            clip: config.clip_incomplete_entities,
            available: Trackers::new(config.id_tracker),
            required: completeness
                .buffers_relations()
                .then(|| Trackers::new(config.id_tracker)),
            stores: Stores::default(),
            sink,
            released: false,
        };
        if let Err(err) = filter.allocate_stores(create) {
            filter.release();
            return Err(err);
        }
        Ok(filter)
    }

    fn allocate_stores<F>(&mut self, mut create: F) -> Result<(), RecordStoreError>
    where
        F: FnMut(&'static str) -> Result<ChangeStore, RecordStoreError>,
    {
        if self.completeness.buffers_all() {
            self.stores.nodes = Some(create("afn")?);
            self.stores.ways = Some(create("afw")?);
        }
        if self.completeness.buffers_relations() {
            self.stores.relations = Some(create("afr")?);
        }
        Ok(())
    }

    /// The normalised completeness mode.
    #[must_use]
    pub const fn completeness(&self) -> Completeness {
        self.completeness
    }

    /// Whether `node` lies inside the filter area.
    #[must_use]
    pub fn is_within_area(&self, node: &Node) -> bool {
        self.area.contains(node)
    }

    /// Whether the entity `id` of `kind` has been selected so far.
    ///
    /// Entities only pulled in by completion become available once
    /// [`ChangeSink::complete`] has run.
    #[must_use]
    pub fn is_available(&self, kind: EntityKind, id: EntityId) -> bool {
        self.available.of(kind).get(id)
    }

    /// Number of selected entities of `kind`.
    #[must_use]
    pub fn available_count(&self, kind: EntityKind) -> usize {
        self.available.of(kind).len()
    }

    /// The downstream sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the filter and return the downstream sink.
    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn way_in_area(&self, way: &Way) -> bool {
        way.nodes.iter().any(|id| self.available.nodes.get(*id))
    }

    fn relation_in_area(&self, relation: &Relation) -> bool {
        relation
            .members
            .iter()
            .any(|member| self.available.of(member.kind).get(member.id))
    }

    fn buffer(&mut self, kind: EntityKind, change: Change) -> Result<(), SinkError> {
        self.stores
            .of_mut(kind)
            .ok_or(RecordStoreError::Released)?
            .add(change)?;
        Ok(())
    }

    fn resolve_required(&mut self) -> Result<(), SinkError> {
        let Some(required) = self.required.as_mut() else {
            return Ok(());
        };
        if let Some(store) = self.stores.relations.as_mut() {
            cascade_parents(store, &self.available, required)?;
            if self.completeness.completes_relations() {
                complete_members(store, &self.available, required)?;
            }
        }
        if let Some(store) = self.stores.ways.as_mut() {
            complete_way_nodes(store, &self.available, required)?;
        }
        log::debug!(
            "completion requires {} nodes, {} ways, {} relations",
            required.nodes.len(),
            required.ways.len(),
            required.relations.len()
        );
        Ok(())
    }

    fn replay(&mut self, kind: EntityKind) -> Result<(), SinkError> {
        let Self {
            stores,
            available,
            sink,
            clip,
            ..
        } = self;
        let Some(store) = stores.of_mut(kind) else {
            return Ok(());
        };
        for record in store.iterate()? {
            let change = record?;
            if available.of(kind).get(change.entity.id()) {
                forward(sink, available, *clip, change)?;
            }
        }
        Ok(())
    }
}

impl<A: Area, S: ChangeSink> ChangeSink for AreaFilter<A, S> {
    fn initialize(&mut self, metadata: &Metadata) -> Result<(), SinkError> {
        self.sink.initialize(metadata)
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        let buffered = self.completeness.buffers_all();
        let (kind, selected) = match &change.entity {
            Entity::Node(node) => {
                let inside = self.area.contains(node);
                if inside {
                    self.available.nodes.set(node.id);
                }
                (EntityKind::Node, inside)
            }
            Entity::Way(way) => {
                let in_area = self.way_in_area(way);
                if in_area {
                    self.available.ways.set(way.id);
                    if let (true, Some(required)) =
                        (self.completeness.completes_ways(), self.required.as_mut())
                    {
                        for id in way.nodes.iter().copied() {
                            if !self.available.nodes.get(id) {
                                required.nodes.set(id);
                            }
                        }
                    }
                }
                (EntityKind::Way, in_area)
            }
            Entity::Relation(relation) => {
                let in_area = self.relation_in_area(relation);
                if in_area {
                    self.available.relations.set(relation.id);
                }
                (EntityKind::Relation, in_area)
            }
        };
        let deferred = buffered
            || (kind == EntityKind::Relation && self.completeness.buffers_relations());
        if deferred {
            self.buffer(kind, change)
        } else if selected {
            forward(&mut self.sink, &self.available, self.clip, change)
        } else {
            Ok(())
        }
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        if self.completeness.buffers_relations() {
            self.resolve_required()?;
            if let Some(required) = self.required.take() {
                self.available.merge(&required);
            }
            for kind in [EntityKind::Node, EntityKind::Way, EntityKind::Relation] {
                self.replay(kind)?;
            }
        }
        self.sink.complete()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stores.release();
        self.sink.release();
        self.released = true;
    }
}

fn forward<S: ChangeSink>(
    sink: &mut S,
    available: &Trackers,
    clip: bool,
    mut change: Change,
) -> Result<(), SinkError> {
    if clip {
        match &mut change.entity {
            Entity::Node(_) => {}
            Entity::Way(way) => way.nodes.retain(|id| available.nodes.get(*id)),
            Entity::Relation(relation) => relation
                .members
                .retain(|member| available.of(member.kind).get(member.id)),
        }
    }
    sink.process(change)
}

fn is_selected(available: &Trackers, required: &Trackers, kind: EntityKind, id: EntityId) -> bool {
    available.of(kind).get(id) || required.of(kind).get(id)
}

/// Mark relations with a selected relation member until none is added.
fn cascade_parents(
    store: &mut ChangeStore,
    available: &Trackers,
    required: &mut Trackers,
) -> Result<(), RecordStoreError> {
    let mut passes = 0_usize;
    loop {
        passes += 1;
        let mut added = 0_usize;
        for record in store.iterate()? {
            let change = record?;
            let Entity::Relation(relation) = &change.entity else {
                continue;
            };
            if is_selected(available, required, EntityKind::Relation, relation.id) {
                continue;
            }
            let has_selected_child = relation.members.iter().any(|member| {
                member.kind == EntityKind::Relation
                    && is_selected(available, required, EntityKind::Relation, member.id)
            });
            if has_selected_child {
                required.relations.set(relation.id);
                added += 1;
            }
        }
        if added == 0 {
            log::debug!("relation cascade settled after {passes} passes");
            return Ok(());
        }
    }
}

/// Require the members of every selected relation, one level deep.
fn complete_members(
    store: &mut ChangeStore,
    available: &Trackers,
    required: &mut Trackers,
) -> Result<(), RecordStoreError> {
    let mut members = Vec::new();
    for record in store.iterate()? {
        let change = record?;
        let Entity::Relation(relation) = &change.entity else {
            continue;
        };
        if !is_selected(available, required, EntityKind::Relation, relation.id) {
            continue;
        }
        members.extend(
            relation
                .members
                .iter()
                .filter(|member| !available.of(member.kind).get(member.id))
                .map(|member| (member.kind, member.id)),
        );
    }
    for (kind, id) in members {
        required.of_mut(kind).set(id);
    }
    Ok(())
}

/// Require the unavailable nodes of required ways.
fn complete_way_nodes(
    store: &mut ChangeStore,
    available: &Trackers,
    required: &mut Trackers,
) -> Result<(), RecordStoreError> {
    if required.ways.is_empty() {
        return Ok(());
    }
    for record in store.iterate()? {
        let change = record?;
        let Entity::Way(way) = &change.entity else {
            continue;
        };
        if !required.ways.get(way.id) {
            continue;
        }
        for id in way.nodes.iter().copied() {
            if !available.nodes.get(id) {
                required.nodes.set(id);
            }
        }
    }
    Ok(())
}
