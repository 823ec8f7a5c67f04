use pathdoc_core::db::open_db_in_memory;
use pathdoc_core::{Node, NodeId, NodeStore, SqliteNodeStore, StoreError};
use rusqlite::Connection;
use serde_json::json;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn id(value: &str) -> NodeId {
    NodeId::from(value)
}

fn sample_tree() -> Node {
    Node::from_value(&json!({
        "markup": "document",
        "id": "root",
        "children": [
            { "markup": "paragraph", "id": "a", "children": [
                { "markup": "text", "id": "a0", "content": "alpha" },
                { "markup": "text", "id": "a1", "content": "beta" }
            ]},
            { "markup": "list", "id": "b", "style": "color: blue", "children": [
                { "markup": "item", "id": "b0" }
            ]},
            { "markup": "paragraph", "id": "c" }
        ]
    }))
    .unwrap()
}

fn paths(store: &SqliteNodeStore<'_>, root_id: &NodeId) -> Vec<(String, String)> {
    let mut items = Vec::new();
    let mut stack = vec![String::new()];
    while let Some(path) = stack.pop() {
        let Some(row) = store.get_by_path(root_id, &path).unwrap() else {
            continue;
        };
        items.push((path.clone(), row.id.as_str().to_string()));
        for index in 0..16 {
            let child = if path.is_empty() {
                index.to_string()
            } else {
                format!("{path}/{index}")
            };
            stack.push(child);
        }
    }
    items.sort();
    items
}

#[test]
fn persist_tree_writes_one_row_per_node_with_materialized_paths() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();

    assert_eq!(store.persist_tree(&sample_tree()).unwrap(), 7);

    let expected: Vec<(String, String)> = [
        ("", "root"),
        ("0", "a"),
        ("0/0", "a0"),
        ("0/1", "a1"),
        ("1", "b"),
        ("1/0", "b0"),
        ("2", "c"),
    ]
    .iter()
    .map(|(path, id)| (path.to_string(), id.to_string()))
    .collect();
    assert_eq!(paths(&store, &id("root")), expected);

    let b = store.get_row(&id("b")).unwrap().unwrap();
    assert_eq!(b.root_id, id("root"));
    assert_eq!(b.markup, "list");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&b.attributes).unwrap(),
        json!({ "style": "color: blue" })
    );
}

#[test]
fn persisting_again_replaces_previous_rows() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();

    let smaller = Node::with_id(id("root"), "document").with_child(Node::with_id(id("z"), "table"));
    assert_eq!(store.persist_tree(&smaller).unwrap(), 2);

    assert!(store.get_row(&id("a0")).unwrap().is_none());
    assert_eq!(store.get_by_path(&id("root"), "0").unwrap().unwrap().id, id("z"));
}

#[test]
fn reconstruct_rebuilds_the_exported_structure() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let tree = sample_tree();
    store.persist_tree(&tree).unwrap();

    let rebuilt = store.reconstruct(&id("root")).unwrap().unwrap();
    assert_eq!(rebuilt.to_value(), tree.to_value());

    let subtree = store.reconstruct(&id("a")).unwrap().unwrap();
    assert_eq!(subtree.to_value(), tree.children()[0].to_value());

    assert!(store.reconstruct(&id("missing")).unwrap().is_none());
}

#[test]
fn reconstruct_orders_siblings_numerically() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let mut root = Node::with_id(id("root"), "document");
    for index in 0..12 {
        root = root.with_child(Node::with_id(id(&format!("n{index}")), "paragraph"));
    }
    store.persist_tree(&root).unwrap();

    let rebuilt = store.reconstruct(&id("root")).unwrap().unwrap();
    let order: Vec<&str> = rebuilt
        .children()
        .iter()
        .map(|child| child.id().as_str())
        .collect();
    let expected: Vec<String> = (0..12).map(|index| format!("n{index}")).collect();
    assert_eq!(order, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn delete_subtree_removes_descendants_and_renumbers_later_siblings() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();

    assert_eq!(store.delete_subtree(&id("a")).unwrap(), 3);

    assert!(store.get_row(&id("a1")).unwrap().is_none());
    assert_eq!(store.get_row(&id("b")).unwrap().unwrap().path, "0");
    assert_eq!(store.get_row(&id("b0")).unwrap().unwrap().path, "0/0");
    assert_eq!(store.get_row(&id("c")).unwrap().unwrap().path, "1");

    let rebuilt = store.reconstruct(&id("root")).unwrap().unwrap();
    assert_eq!(rebuilt.children().len(), 2);
}

#[test]
fn delete_root_removes_whole_tree() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();

    assert_eq!(store.delete_subtree(&id("root")).unwrap(), 7);
    assert!(store.list_roots().unwrap().is_empty());
    assert!(matches!(
        store.delete_subtree(&id("root")),
        Err(StoreError::NodeNotFound(_))
    ));
}

#[test]
fn insert_then_delete_at_same_path_restores_path_set() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();
    let before = paths(&store, &id("root"));

    let inserted = Node::with_id(id("new"), "paragraph").with_child(Node::with_id(id("new0"), "text"));
    assert_eq!(store.insert_subtree(&id("root"), "1", &inserted).unwrap(), 2);
    assert_eq!(store.get_row(&id("new0")).unwrap().unwrap().path, "1/0");
    assert_eq!(store.get_row(&id("b")).unwrap().unwrap().path, "2");
    assert_eq!(store.get_row(&id("b0")).unwrap().unwrap().path, "2/0");
    assert_eq!(store.get_row(&id("a1")).unwrap().unwrap().path, "0/1");

    store.delete_subtree(&id("new")).unwrap();
    assert_eq!(paths(&store, &id("root")), before);
}

#[test]
fn shift_siblings_is_limited_to_the_exact_parent() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();

    assert_eq!(store.shift_siblings(&id("root"), "0/1", 1).unwrap(), 1);
    assert_eq!(store.get_row(&id("a1")).unwrap().unwrap().path, "0/2");
    assert_eq!(store.get_row(&id("a0")).unwrap().unwrap().path, "0/0");
    assert_eq!(store.get_row(&id("b0")).unwrap().unwrap().path, "1/0");

    store.shift_siblings(&id("root"), "0/1", -1).unwrap();
    assert_eq!(store.get_row(&id("a1")).unwrap().unwrap().path, "0/1");
}

#[test]
fn insert_subtree_rejects_gaps_and_missing_parents() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();

    let orphan = Node::new("text");
    assert!(matches!(
        store.insert_subtree(&id("root"), "9", &orphan),
        Err(StoreError::InvalidPath(_))
    ));
    assert!(matches!(
        store.insert_subtree(&id("root"), "7/0", &orphan),
        Err(StoreError::InvalidPath(_))
    ));
    assert!(matches!(
        store.insert_subtree(&id("root"), "", &orphan),
        Err(StoreError::InvalidPath(_))
    ));
    assert!(store.get_row(orphan.id()).unwrap().is_none());
}

#[test]
fn update_node_rewrites_markup_and_attributes() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let mut tree = sample_tree();
    store.persist_tree(&tree).unwrap();

    tree.set("2/content", "gamma").unwrap();
    let c = tree.find_by_id(&id("c")).unwrap();
    store.update_node(c).unwrap();

    let rebuilt = store.reconstruct(&id("c")).unwrap().unwrap();
    assert_eq!(rebuilt.attributes().content(), Some("gamma"));

    let ghost = Node::new("text");
    assert!(matches!(
        store.update_node(&ghost),
        Err(StoreError::NodeNotFound(_))
    ));
}

#[test]
fn parent_and_roots_are_derived_from_paths() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();
    store
        .persist_tree(&Node::with_id(id("second"), "document"))
        .unwrap();

    assert_eq!(store.parent(&id("a1")).unwrap().unwrap().id, id("a"));
    assert_eq!(store.parent(&id("a")).unwrap().unwrap().id, id("root"));
    assert!(store.parent(&id("root")).unwrap().is_none());
    assert_eq!(store.list_roots().unwrap(), vec![id("root"), id("second")]);
}

#[test]
fn search_matches_markup_and_attribute_text() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();

    let hits: Vec<NodeId> = store
        .search("alpha")
        .unwrap()
        .into_iter()
        .map(|row| row.id)
        .collect();
    assert_eq!(hits, vec![id("a0")]);

    assert_eq!(store.search("item").unwrap().len(), 1);
    assert!(store.search("100%").unwrap().is_empty());
}

#[test]
fn search_is_case_sensitive_and_ordered_by_numeric_path() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let mut root = Node::with_id(id("root"), "document");
    for index in 0..12 {
        let mut child = Node::with_id(id(&format!("n{index}")), "text");
        child.attributes_mut().set_content("Note");
        root = root.with_child(child);
    }
    store.persist_tree(&root).unwrap();

    let hits: Vec<String> = store
        .search("Note")
        .unwrap()
        .into_iter()
        .map(|row| row.path)
        .collect();
    let expected: Vec<String> = (0..12).map(|index| index.to_string()).collect();
    assert_eq!(hits, expected);

    assert!(store.search("note").unwrap().is_empty());
    assert!(store.search("NOTE").unwrap().is_empty());
}

#[test]
fn reconstruct_reports_non_contiguous_rows() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    store.persist_tree(&sample_tree()).unwrap();
    conn.execute(
        "UPDATE document_nodes SET path = '5' WHERE id = 'c';",
        [],
    )
    .unwrap();

    assert!(matches!(
        store.reconstruct(&id("root")),
        Err(StoreError::InvalidData(_))
    ));
}
