pub mod error;
pub mod index_engine;
pub mod key;
pub mod node;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::super::storage_layer::collection_page::{CollectionPage, IndexDescriptor};
    use super::super::storage_layer::header::SALT_SIZE;
    use super::super::storage_layer::page::PageAddress;
    use super::super::storage_layer::paged_storage::PagedStorage;
    use super::super::storage_layer::storage::Storage;
    use super::error::IndexError;
    use super::index_engine::{IndexEngine, Order};
    use super::key::IndexKey;

    fn fixture() -> (TempDir, PagedStorage, CollectionPage) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path(), 0, [0u8; SALT_SIZE]).unwrap());
        (dir, PagedStorage::new(storage), CollectionPage::new("test"))
    }

    fn keys(nodes: &[super::node::IndexNode]) -> Vec<IndexKey> {
        nodes.iter().map(|node| node.key.clone()).collect()
    }

    fn block(n: u16) -> PageAddress {
        PageAddress::new(1000, n)
    }

    fn nearest(
        engine: &mut IndexEngine<'_>,
        index: &IndexDescriptor,
        key: i64,
        sibling: bool,
        order: Order,
    ) -> Option<IndexKey> {
        engine
            .find(index, &IndexKey::Int(key), sibling, order)
            .unwrap()
            .map(|node| node.key)
    }

    //primary key node first, then one node per tag and a city node
    fn add_document(
        engine: &mut IndexEngine<'_>,
        collection: &mut CollectionPage,
        indexes: &[IndexDescriptor; 3],
        id: i64,
        tags: &[&str],
        at: u16,
    ) -> PageAddress {
        let [primary, tag_index, city] = indexes;
        let pk = engine
            .add_node(collection, primary, IndexKey::Int(id), None)
            .unwrap();
        engine.set_data_block(pk.position, block(at)).unwrap();
        for tag in tags {
            let node = engine
                .add_node(collection, tag_index, IndexKey::from(*tag), Some(pk.position))
                .unwrap();
            engine.set_data_block(node.position, block(at)).unwrap();
        }
        let node = engine
            .add_node(collection, city, IndexKey::from("paris"), Some(pk.position))
            .unwrap();
        engine.set_data_block(node.position, block(at)).unwrap();
        pk.position
    }

    #[test]
    fn key_ordering_test() {
        let ordered = vec![
            IndexKey::MinValue,
            IndexKey::Null,
            IndexKey::Int(-5),
            IndexKey::Float(-0.5),
            IndexKey::Int(2),
            IndexKey::Float(2.5),
            IndexKey::String("a".into()),
            IndexKey::String("b".into()),
            IndexKey::Bool(false),
            IndexKey::Bool(true),
            IndexKey::MaxValue,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} should sort before {}", pair[0], pair[1]);
        }

        assert_eq!(IndexKey::Int(3), IndexKey::Float(3.0));
        assert_ne!(IndexKey::Int(3), IndexKey::String("3".into()));

        //integers above 2^53 are not rounded when compared with floats
        let big = 1i64 << 53;
        assert_eq!(IndexKey::Int(big), IndexKey::Float(big as f64));
        assert!(IndexKey::Int(big + 1) > IndexKey::Float(big as f64));
        assert!(IndexKey::Float(big as f64) < IndexKey::Int(big + 1));
        assert!(IndexKey::Int(i64::MAX) < IndexKey::Float(9.3e18));
        assert!(IndexKey::Int(i64::MAX) < IndexKey::Float(i64::MAX as f64));
        assert_eq!(IndexKey::Int(i64::MIN), IndexKey::Float(i64::MIN as f64));
        assert!(IndexKey::Float(f64::INFINITY) > IndexKey::Int(i64::MAX));
        assert!(IndexKey::Float(f64::NEG_INFINITY) < IndexKey::Int(i64::MIN));
        assert!(IndexKey::Float(f64::NAN) > IndexKey::Int(i64::MAX));
        assert!(IndexKey::Int(0) < IndexKey::Float(0.5));
        assert!(IndexKey::Float(0.5) < IndexKey::Int(1));
        assert!(IndexKey::Int(-1) < IndexKey::Float(-0.5));
        assert!(IndexKey::Float(-0.5) < IndexKey::Int(0));
        assert_eq!(IndexKey::Float(-0.0), IndexKey::Int(0));
        assert_eq!(IndexKey::Float(-0.0), IndexKey::Float(0.0));

        //mixed numbers sort consistently in every pairing
        let mut mixed = vec![
            IndexKey::Int(big + 1),
            IndexKey::Float(big as f64),
            IndexKey::Int(big - 1),
            IndexKey::Float(big as f64 + 2.0),
            IndexKey::Int(big),
        ];
        mixed.sort();
        for (i, a) in mixed.iter().enumerate() {
            for b in &mixed[i..] {
                assert!(a <= b, "{} should not sort after {}", a, b);
            }
        }

        assert_eq!(IndexKey::from_json(&json!({"$minKey": 1})), Some(IndexKey::MinValue));
        assert_eq!(IndexKey::from_json(&json!({"$maxKey": 1})), Some(IndexKey::MaxValue));
        assert_eq!(IndexKey::from_json(&json!(null)), Some(IndexKey::Null));
        assert_eq!(IndexKey::from_json(&json!(1.5)), Some(IndexKey::Float(1.5)));
        assert_eq!(IndexKey::from_json(&json!([1, 2])), None);
        assert_eq!(IndexKey::from_json(&json!({"a": 1})), None);
        assert_eq!(IndexKey::from_json(&IndexKey::MaxValue.to_json()), Some(IndexKey::MaxValue));
    }

    #[test]
    fn ordered_insert_test() {
        let (_dir, mut paged, mut collection) = fixture();
        let mut engine = IndexEngine::new(&mut paged);
        let index = engine
            .create_index(&mut collection, 1, "age", "$.age", false, 8)
            .unwrap();

        //enough nodes to spill over several index pages
        let values: Vec<i64> = (0..600).map(|i| (i * 7919) % 600).collect();
        for value in values.iter() {
            engine
                .add_node(&mut collection, &index, IndexKey::Int(*value), None)
                .unwrap();
        }

        let ascending = engine.find_all_ordered(&index, Order::Ascending).unwrap();
        let expected: Vec<IndexKey> = (0..600).map(IndexKey::Int).collect();
        assert_eq!(keys(&ascending), expected);

        let descending = engine.find_all_ordered(&index, Order::Descending).unwrap();
        let mut reversed = expected.clone();
        reversed.reverse();
        assert_eq!(keys(&descending), reversed);

        //delete every even key and check the structure still holds
        for node in ascending.iter().filter(|node| matches!(node.key, IndexKey::Int(v) if v % 2 == 0)) {
            engine.delete(&collection, &index, node.position).unwrap();
        }
        let remaining = engine.find_all_ordered(&index, Order::Ascending).unwrap();
        let expected: Vec<IndexKey> = (0..600).filter(|v| v % 2 == 1).map(IndexKey::Int).collect();
        assert_eq!(keys(&remaining), expected);
        let descending = engine.find_all_ordered(&index, Order::Descending).unwrap();
        assert_eq!(descending.len(), 300);

        assert!(engine
            .find(&index, &IndexKey::Int(10), false, Order::Ascending)
            .unwrap()
            .is_none());
        assert!(engine
            .find(&index, &IndexKey::Int(11), false, Order::Ascending)
            .unwrap()
            .is_some());
    }

    #[test]
    fn find_sibling_test() {
        let (_dir, mut paged, mut collection) = fixture();
        let mut engine = IndexEngine::new(&mut paged);
        let index = engine
            .create_index(&mut collection, 1, "n", "$.n", true, 32)
            .unwrap();

        for value in [10i64, 20, 30] {
            engine
                .add_node(&mut collection, &index, IndexKey::Int(value), None)
                .unwrap();
        }

        assert_eq!(nearest(&mut engine, &index, 20, false, Order::Ascending), Some(IndexKey::Int(20)));
        assert_eq!(nearest(&mut engine, &index, 20, false, Order::Descending), Some(IndexKey::Int(20)));
        assert_eq!(nearest(&mut engine, &index, 15, false, Order::Ascending), None);
        assert_eq!(nearest(&mut engine, &index, 15, true, Order::Ascending), Some(IndexKey::Int(20)));
        assert_eq!(nearest(&mut engine, &index, 15, true, Order::Descending), Some(IndexKey::Int(10)));
        assert_eq!(nearest(&mut engine, &index, 35, true, Order::Ascending), None);
        assert_eq!(nearest(&mut engine, &index, 5, true, Order::Descending), None);
    }

    #[test]
    fn duplicate_keys_test() {
        let (_dir, mut paged, mut collection) = fixture();
        let mut engine = IndexEngine::new(&mut paged);
        let unique = engine
            .create_index(&mut collection, 0, "_id", "$._id", true, 32)
            .unwrap();
        let multi = engine
            .create_index(&mut collection, 1, "tag", "$.tag", false, 32)
            .unwrap();

        engine
            .add_node(&mut collection, &unique, IndexKey::from("a"), None)
            .unwrap();
        match engine.add_node(&mut collection, &unique, IndexKey::from("a"), None) {
            Err(IndexError::DuplicateKey { index, key }) => {
                assert_eq!(index, "_id");
                assert_eq!(key, IndexKey::from("a"));
            }
            other => panic!("expected duplicate key, got {:?}", other),
        }

        //equal keys come back in insertion order
        for n in 0..5u16 {
            let node = engine
                .add_node(&mut collection, &multi, IndexKey::from("x"), None)
                .unwrap();
            engine.set_data_block(node.position, block(n)).unwrap();
        }
        engine
            .add_node(&mut collection, &multi, IndexKey::from("w"), None)
            .unwrap();

        let found = engine.find_all(&multi, &IndexKey::from("x")).unwrap();
        let blocks: Vec<PageAddress> = found.iter().map(|node| node.data_block).collect();
        assert_eq!(blocks, (0..5).map(block).collect::<Vec<_>>());

        let last = engine
            .find(&multi, &IndexKey::from("x"), false, Order::Descending)
            .unwrap()
            .unwrap();
        assert_eq!(last.data_block, block(4));

        for sentinel in [IndexKey::MinValue, IndexKey::MaxValue] {
            assert!(matches!(
                engine.add_node(&mut collection, &multi, sentinel, None),
                Err(IndexError::InvalidIndexKey(_))
            ));
        }

        let long_key = IndexKey::String("k".repeat(2000));
        assert!(matches!(
            engine.add_node(&mut collection, &multi, long_key, None),
            Err(IndexError::InvalidIndexKey(_))
        ));
    }

    #[test]
    fn large_integer_keys_test() {
        let (_dir, mut paged, mut collection) = fixture();
        let mut engine = IndexEngine::new(&mut paged);
        let index = engine
            .create_index(&mut collection, 1, "n", "$.n", true, 32)
            .unwrap();

        let big = 1i64 << 53;
        for (n, value) in [big, big + 1, big - 1].into_iter().enumerate() {
            let node = engine
                .add_node(&mut collection, &index, IndexKey::Int(value), None)
                .unwrap();
            engine.set_data_block(node.position, block(n as u16)).unwrap();
        }

        let found = engine
            .find(&index, &IndexKey::Float(big as f64), false, Order::Ascending)
            .unwrap()
            .unwrap();
        assert_eq!(found.key, IndexKey::Int(big));
        assert_eq!(found.data_block, block(0));

        let ordered = engine.find_all_ordered(&index, Order::Ascending).unwrap();
        assert_eq!(
            keys(&ordered),
            vec![IndexKey::Int(big - 1), IndexKey::Int(big), IndexKey::Int(big + 1)]
        );
    }

    #[test]
    fn document_chain_test() {
        let (_dir, mut paged, mut collection) = fixture();
        let mut engine = IndexEngine::new(&mut paged);
        let primary = engine
            .create_index(&mut collection, 0, "_id", "$._id", true, 32)
            .unwrap();
        let tags = engine
            .create_index(&mut collection, 1, "tags", "$.tags", false, 32)
            .unwrap();
        let city = engine
            .create_index(&mut collection, 2, "city", "$.city", false, 32)
            .unwrap();

        let indexes = [primary.clone(), tags.clone(), city.clone()];
        let first = add_document(&mut engine, &mut collection, &indexes, 1, &["a", "b"], 1);
        let second = add_document(&mut engine, &mut collection, &indexes, 2, &["b", "c"], 2);

        let pk = engine.read_node(first).unwrap();
        let all = engine.get_node_list(&pk, true).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|node| node.data_block == block(1)));

        let secondary = engine.get_node_list(&pk, false).unwrap();
        assert_eq!(secondary.len(), 3);
        assert!(secondary.iter().all(|node| node.slot != 0));

        //the same list is reachable from any node of the document
        let from_middle = engine.get_node_list(&secondary[1], true).unwrap();
        let mut positions: Vec<PageAddress> = from_middle.iter().map(|n| n.position).collect();
        let mut expected: Vec<PageAddress> = all.iter().map(|n| n.position).collect();
        positions.sort();
        expected.sort();
        assert_eq!(positions, expected);

        //deleting one node leaves the other slot and the other document alone
        let tag_b = secondary
            .iter()
            .find(|node| node.key == IndexKey::from("b"))
            .unwrap();
        engine.delete(&collection, &tags, tag_b.position).unwrap();

        let after = engine.get_node_list(&pk, true).unwrap();
        assert_eq!(after.len(), 3);
        let tag_nodes = engine.find_all(&tags, &IndexKey::from("b")).unwrap();
        assert_eq!(tag_nodes.len(), 1);
        assert_eq!(tag_nodes[0].data_block, block(2));
        assert_eq!(engine.find_all(&city, &IndexKey::from("paris")).unwrap().len(), 2);

        let second_pk = engine.read_node(second).unwrap();
        assert_eq!(engine.get_node_list(&second_pk, true).unwrap().len(), 4);

        //removing a whole document
        let pk = engine.read_node(first).unwrap();
        assert_eq!(engine.delete_document(&collection, &pk).unwrap(), 3);
        assert_eq!(
            keys(&engine.find_all_ordered(&primary, Order::Ascending).unwrap()),
            vec![IndexKey::Int(2)]
        );
        assert_eq!(engine.find_all(&city, &IndexKey::from("paris")).unwrap().len(), 1);

        assert!(matches!(
            engine.delete(&collection, &tags, tags.head),
            Err(IndexError::CorruptIndex(_))
        ));
    }
}
