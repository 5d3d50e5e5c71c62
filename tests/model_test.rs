mod common;

use anyhow::Result;
use common::CountingBackend;
use pagestore::storage::{shared, PageId, PageRef, StorageBackend, StorageError};
use pagestore::{Session, SessionConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Drive a session with seeded random operations and compare against a plain map.
fn run_model(config: SessionConfig, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let backend = shared(CountingBackend::default());
    let mut session = Session::open(backend.clone(), config)?;
    let mut model: BTreeMap<PageId, Vec<u8>> = BTreeMap::new();

    for _ in 0..2000 {
        let live: Vec<PageId> = model.keys().copied().collect();
        let op = rng.gen_range(0..10);

        if live.is_empty() || op < 3 {
            let len = rng.gen_range(0..64);
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let page_id = session.store(PageRef::New, data.clone())?;
            assert!(!model.contains_key(&page_id), "{} handed out twice", page_id);
            model.insert(page_id, data);
            continue;
        }

        let page_id = live[rng.gen_range(0..live.len())];
        match op {
            3..=5 => {
                let data: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();
                assert_eq!(session.store(page_id, data.clone())?, page_id);
                model.insert(page_id, data);
            }
            6..=8 => {
                assert_eq!(session.load(page_id)?.to_vec(), model[&page_id]);
            }
            _ => {
                session.delete(page_id)?;
                model.remove(&page_id);
                assert!(matches!(
                    session.load(page_id),
                    Err(StorageError::InvalidPage(_))
                ));
            }
        }
    }

    session.close()?;

    // After close the backend alone must hold exactly the model.
    let backend = backend.lock();
    assert_eq!(backend.inner.page_count(), model.len());
    for page in backend.inner.pages() {
        assert_eq!(page.data.to_vec(), model[&page.id]);
    }
    assert_eq!(backend.creates, 1);
    assert_eq!(backend.destroys, 1);

    Ok(())
}

#[test]
fn test_model_deferred_writes() -> Result<()> {
    for seed in 0..4 {
        run_model(SessionConfig::default().with_capacity(8), seed)?;
    }
    Ok(())
}

#[test]
fn test_model_tiny_buffer() -> Result<()> {
    run_model(SessionConfig::default().with_capacity(1), 42)
}

#[test]
fn test_model_writethrough() -> Result<()> {
    run_model(SessionConfig::default().with_writethrough(true), 7)
}

#[test]
fn test_model_passthrough() -> Result<()> {
    run_model(SessionConfig::passthrough(), 99)
}
