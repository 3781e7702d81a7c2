//! Behavioural coverage for filtering change streams to a bounding box.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use osmfence_core::{
    AreaFilter, AreaFilterConfig, BoundingBox, Change, ChangeSink, EntityId, EntityKind, Member,
    Metadata, Node, RecordStoreKind, Relation, Way,
};

#[fixture]
fn area() -> RefCell<Option<BoundingBox>> {
    RefCell::new(None)
}

#[fixture]
fn settings() -> RefCell<AreaFilterConfig> {
    RefCell::new(AreaFilterConfig {
        record_store: RecordStoreKind::Memory,
        ..AreaFilterConfig::default()
    })
}

#[fixture]
fn emitted() -> RefCell<Vec<Change>> {
    RefCell::new(Vec::new())
}

fn node(id: EntityId, lon: f64, lat: f64) -> Change {
    Change::create(Node::new(id, 1, lon, lat))
}

fn run(
    area: &RefCell<Option<BoundingBox>>,
    settings: &RefCell<AreaFilterConfig>,
    emitted: &RefCell<Vec<Change>>,
    changes: Vec<Change>,
) {
    let configured = *area.borrow();
    let bound = configured.unwrap_or_else(|| panic!("bounding box must be configured"));
    let mut filter = AreaFilter::new(bound, *settings.borrow(), Vec::new())
        .unwrap_or_else(|err| panic!("create filter: {err}"));
    let outcome = filter.initialize(&Metadata::new()).and_then(|()| {
        changes
            .into_iter()
            .try_for_each(|change| filter.process(change))
            .and_then(|()| filter.complete())
    });
    filter.release();
    if let Err(err) = outcome {
        panic!("filtering failed: {err}");
    }
    *emitted.borrow_mut() = filter.into_sink();
}

fn summary(emitted: &RefCell<Vec<Change>>) -> Vec<(EntityKind, EntityId)> {
    emitted
        .borrow()
        .iter()
        .map(|change| (change.entity.kind(), change.entity.id()))
        .collect()
}

#[given("a bounding box from -20 to 20 degrees on both axes")]
fn given_box(#[from(area)] area: &RefCell<Option<BoundingBox>>) {
    let bound = BoundingBox::new(-20.0, 20.0, 20.0, -20.0)
        .unwrap_or_else(|err| panic!("valid box: {err}"));
    *area.borrow_mut() = Some(bound);
}

#[given("a filter without completeness options")]
fn given_plain_filter(#[from(settings)] settings: &RefCell<AreaFilterConfig>) {
    let mut config = settings.borrow_mut();
    config.complete_ways = false;
    config.complete_relations = false;
    config.cascading_relations = false;
}

#[given("a filter completing ways")]
fn given_complete_ways(#[from(settings)] settings: &RefCell<AreaFilterConfig>) {
    settings.borrow_mut().complete_ways = true;
}

#[given("a filter cascading relations")]
fn given_cascading(#[from(settings)] settings: &RefCell<AreaFilterConfig>) {
    settings.borrow_mut().cascading_relations = true;
}

#[when("node 1 at 10,10, node 2 at 30,30 and node 3 at 20,10 are processed")]
fn when_three_nodes(
    #[from(area)] area: &RefCell<Option<BoundingBox>>,
    #[from(settings)] settings: &RefCell<AreaFilterConfig>,
    #[from(emitted)] emitted: &RefCell<Vec<Change>>,
) {
    let changes = vec![node(1, 10.0, 10.0), node(2, 30.0, 30.0), node(3, 20.0, 10.0)];
    run(area, settings, emitted, changes);
}

#[when("a way joins inside node 1 with outside node 2")]
fn when_way_leaves_box(
    #[from(area)] area: &RefCell<Option<BoundingBox>>,
    #[from(settings)] settings: &RefCell<AreaFilterConfig>,
    #[from(emitted)] emitted: &RefCell<Vec<Change>>,
) {
    let changes = vec![
        node(1, 10.0, 10.0),
        node(2, 30.0, 30.0),
        Change::create(Way::new(10, 1, vec![1, 2])),
    ];
    run(area, settings, emitted, changes);
}

#[when("a parent relation precedes its child relation referencing node 1")]
fn when_parent_first(
    #[from(area)] area: &RefCell<Option<BoundingBox>>,
    #[from(settings)] settings: &RefCell<AreaFilterConfig>,
    #[from(emitted)] emitted: &RefCell<Vec<Change>>,
) {
    let changes = vec![
        node(1, 10.0, 10.0),
        Change::create(Relation::new(
            200,
            1,
            vec![Member::new(100, EntityKind::Relation, "subarea")],
        )),
        Change::create(Relation::new(
            100,
            1,
            vec![Member::new(1, EntityKind::Node, "admin_centre")],
        )),
    ];
    run(area, settings, emitted, changes);
}

#[then("nodes 1 and 3 are emitted")]
fn then_nodes_one_and_three(#[from(emitted)] emitted: &RefCell<Vec<Change>>) {
    assert_eq!(
        summary(emitted),
        vec![(EntityKind::Node, 1), (EntityKind::Node, 3)]
    );
}

#[then("both nodes are emitted before the way")]
fn then_way_complete(#[from(emitted)] emitted: &RefCell<Vec<Change>>) {
    assert_eq!(
        summary(emitted),
        vec![
            (EntityKind::Node, 1),
            (EntityKind::Node, 2),
            (EntityKind::Way, 10)
        ]
    );
}

#[then("the parent relation is emitted after the node")]
fn then_parent_emitted(#[from(emitted)] emitted: &RefCell<Vec<Change>>) {
    assert_eq!(
        summary(emitted),
        vec![
            (EntityKind::Node, 1),
            (EntityKind::Relation, 200),
            (EntityKind::Relation, 100)
        ]
    );
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/area_filter.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "selecting nodes inside a bounding box",
            "completing a way that leaves the box",
            "cascading to a parent relation seen first",
        ]
    );
}

#[scenario(path = "tests/features/area_filter.feature", index = 0)]
fn selecting_nodes(
    area: RefCell<Option<BoundingBox>>,
    settings: RefCell<AreaFilterConfig>,
    emitted: RefCell<Vec<Change>>,
) {
    let _ = (area, settings, emitted);
}

#[scenario(path = "tests/features/area_filter.feature", index = 1)]
fn completing_ways(
    area: RefCell<Option<BoundingBox>>,
    settings: RefCell<AreaFilterConfig>,
    emitted: RefCell<Vec<Change>>,
) {
    let _ = (area, settings, emitted);
}

#[scenario(path = "tests/features/area_filter.feature", index = 2)]
fn cascading_relations(
    area: RefCell<Option<BoundingBox>>,
    settings: RefCell<AreaFilterConfig>,
    emitted: RefCell<Vec<Change>>,
) {
    let _ = (area, settings, emitted);
}
