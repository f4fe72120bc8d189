#[cfg(test)]
mod persistence_tests {
    use crate::persistence::{KeyValueStore, MemoryStore, SledStore, normalize_area};
    use crate::utils::StoreError;
    use tempfile::tempdir;

    fn exercise(store: &dyn KeyValueStore) {
        store.set_string("auth.tokens", "k1", "v1").unwrap();
        store.set("auth.tokens", "k2", &[1, 2, 3]).unwrap();

        assert_eq!(
            store.get_string("auth.tokens", "k1").unwrap(),
            Some("v1".to_string())
        );
        assert_eq!(
            store.get_bytes("auth/tokens", "k2").unwrap(),
            Some(vec![1, 2, 3]),
            "`.` and `/` must normalize to the same area"
        );
        assert_eq!(store.get_string("auth.tokens", "missing").unwrap(), None);

        assert!(store.remove_key("auth_tokens", "k1").unwrap());
        assert!(!store.remove_key("auth_tokens", "k1").unwrap());

        store.set("auth.tokens", "k3", b"once").unwrap();
        assert_eq!(
            store.take_bytes("auth.tokens", "k3").unwrap(),
            Some(b"once".to_vec())
        );
        assert_eq!(store.take_bytes("auth.tokens", "k3").unwrap(), None);
        assert_eq!(store.get_bytes("auth.tokens", "k3").unwrap(), None);

        assert!(store.remove_area("auth.tokens").unwrap());
        assert_eq!(store.get_bytes("auth.tokens", "k2").unwrap(), None);
    }

    #[test]
    fn test_normalize_area() {
        assert_eq!(normalize_area("a.b/c"), "a_b_c");
        assert_eq!(normalize_area("plain"), "plain");
        assert_eq!(normalize_area("./"), "__");
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.set_string("node.info", "id", "n1").unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get_string("node_info", "id").unwrap(),
            Some("n1".to_string())
        );
    }

    #[test]
    fn test_get_string_rejects_invalid_utf8() {
        let store = MemoryStore::new();
        store.set("bin", "k", &[0xff, 0xfe]).unwrap();
        assert!(matches!(
            store.get_string("bin", "k"),
            Err(StoreError::Utf8(_))
        ));
    }
}
