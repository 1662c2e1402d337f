//! End-to-end scenarios for caches sharing one registry

use std::sync::Arc;
use std::thread;

use color_picker_cache::{CacheConfig, CacheManager, EvictionPolicyKind, IntelligentCache, MemorySubsystem};
use color_picker_memory::{
    CleanupRequest, ManualSampler, MemoryConfig, MemorySample, Priority, ResourceKind,
    ResourceRegistry,
};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};

fn registry() -> Arc<ResourceRegistry> {
    ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing())
}

#[test]
fn test_lru_cache_keeps_only_the_newest_large_value() {
    let registry = registry();
    let cache: IntelligentCache<&'static str, u8> = IntelligentCache::new(
        "scenario",
        CacheConfig::default()
            .with_max_size_bytes(400)
            .with_eviction_policy(EvictionPolicyKind::Lru),
        registry.clone(),
    );

    cache.put_with("A", 0, Priority::Normal, Some(100));
    cache.put_with("B", 0, Priority::Normal, Some(200));
    cache.put_with("C", 0, Priority::Normal, Some(300));

    assert_eq!(cache.len(), 1);
    assert!(cache.contains("C"));
    assert_eq!(cache.size_bytes(), 300);
    assert_eq!(registry.current_size(), 300);
}

#[test]
fn test_registry_cleanup_spares_critical_cache_entry() {
    let registry = registry();
    let cache: IntelligentCache<&'static str, u8> =
        IntelligentCache::new("images", CacheConfig::default(), registry.clone());

    cache.put_with("pinned", 0, Priority::Critical, Some(1000));
    cache.put_with("recent-1", 0, Priority::Normal, Some(600));
    cache.put_with("recent-2", 0, Priority::Normal, Some(600));
    let before = registry.current_size();

    let freed = registry.cleanup(CleanupRequest::all().target_bytes(1200));

    assert_eq!(freed, 1200);
    assert_eq!(before - registry.current_size(), 1200);
    assert!(cache.contains("pinned"));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size_bytes(), 1000);
}

#[test]
fn test_caches_of_different_kinds_are_cleaned_selectively() {
    let registry = registry();
    let manager = CacheManager::new(registry.clone());
    let images = manager
        .create::<u32, u32>(
            "images",
            CacheConfig::default().with_resource_kind(ResourceKind::ImageCache),
        )
        .unwrap();
    let palettes = manager
        .create::<u32, u32>(
            "palettes",
            CacheConfig::default().with_resource_kind(ResourceKind::PaletteCache),
        )
        .unwrap();

    for i in 0..3 {
        images.put_with(i, i, Priority::Low, Some(100));
        palettes.put_with(i, i, Priority::Low, Some(100));
    }

    registry.cleanup(
        CleanupRequest::all()
            .target_bytes(u64::MAX)
            .kinds(&[ResourceKind::PaletteCache]),
    );

    assert_eq!(images.len(), 3);
    assert!(palettes.is_empty());
    assert_eq!(registry.kind_size(ResourceKind::ImageCache), 300);
    assert_eq!(registry.kind_size(ResourceKind::PaletteCache), 0);
}

#[test]
fn test_emergency_cleanup_reaches_into_caches() {
    let sampler = ManualSampler::new(MemorySample {
        total: 8 * 1024 * 1024 * 1024,
        available: 6 * 1024 * 1024 * 1024,
        process_resident: 100 * 1024 * 1024,
    });
    let registry = ResourceRegistry::new(MemoryConfig::new(512, 256), sampler.clone());
    let cache: IntelligentCache<u32, u32> =
        IntelligentCache::new("analysis", CacheConfig::default(), registry.clone());
    for i in 0..10 {
        cache.put_with(i, i, Priority::Normal, Some(1000));
    }

    let calm = registry.run_monitor_pass();
    assert!(!calm.warned && !calm.emergency);
    assert_eq!(cache.len(), 10);

    sampler.set(MemorySample {
        total: 8 * 1024 * 1024 * 1024,
        available: 6 * 1024 * 1024 * 1024,
        process_resident: 600 * 1024 * 1024,
    });
    let report = registry.run_monitor_pass();

    assert!(report.emergency);
    assert_eq!(report.bytes_freed, 5000);
    assert_eq!(cache.len(), 5);
    assert_eq!(registry.current_size(), cache.size_bytes());
}

#[test]
fn test_subsystem_shutdown_releases_everything() {
    let memory = MemorySubsystem::with_registry(registry());
    let a = memory.caches().create::<String, String>("a", CacheConfig::default()).unwrap();
    let b = memory.caches().create::<u64, Vec<u8>>("b", CacheConfig::default()).unwrap();
    a.put("x".to_string(), "#123456".to_string());
    b.put(1, vec![0; 256]);

    memory.shutdown();

    assert!(a.is_empty());
    assert!(b.is_empty());
    assert_eq!(memory.registry().current_size(), 0);
    assert_eq!(memory.registry().cleanup(CleanupRequest::all().force()), 0);
}

#[test]
fn test_concurrent_cache_traffic_keeps_registry_consistent() {
    let registry = registry();
    let manager = Arc::new(CacheManager::new(registry.clone()));
    for (name, policy) in [
        ("lru", EvictionPolicyKind::Lru),
        ("lfu", EvictionPolicyKind::Lfu),
        ("adaptive", EvictionPolicyKind::Adaptive),
    ] {
        manager
            .create::<u32, u32>(
                name,
                CacheConfig::default()
                    .with_max_size_bytes(20_000)
                    .with_max_entries(64)
                    .with_eviction_policy(policy),
            )
            .unwrap();
    }

    let handles: Vec<_> = (0..6u64)
        .map(|seed| {
            let manager = manager.clone();
            let registry = registry.clone();
            thread::spawn(move || {
                let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                let names = ["lru", "lfu", "adaptive"];
                for _ in 0..400 {
                    let name = names[rng.gen_range(0..names.len())];
                    let cache = manager
                        .get::<u32, u32>(name)
                        .expect("types match")
                        .expect("cache exists");
                    let key = rng.gen_range(0..128);
                    match rng.gen_range(0..10) {
                        0..=4 => {
                            let priority = if rng.gen_bool(0.1) { Priority::Critical } else { Priority::Normal };
                            cache.put_with(key, key, priority, Some(rng.gen_range(1..2_000)));
                        }
                        5..=7 => {
                            cache.get(&key);
                        }
                        8 => {
                            cache.remove(&key);
                        }
                        _ => {
                            registry.cleanup(CleanupRequest::all().target_bytes(rng.gen_range(0..10_000)));
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    let aggregated = manager.aggregate_stats();
    assert_eq!(registry.current_size(), aggregated.size_bytes);
    assert_eq!(registry.len(), aggregated.entries);
    for (name, stats) in manager.get_all_stats() {
        assert!(stats.size_bytes <= 20_000, "{} over budget", name);
        assert!(stats.entries <= 64, "{} over entry limit", name);
    }
}

proptest! {
    /// Property: a cache never holds more than its size or entry limit
    #[test]
    fn test_cache_respects_limits(
        puts in prop::collection::vec((0u32..32, 1u64..600, any::<bool>()), 1..60),
        policy in prop_oneof![
            Just(EvictionPolicyKind::Lru),
            Just(EvictionPolicyKind::Lfu),
            Just(EvictionPolicyKind::Adaptive),
        ],
    ) {
        let registry = registry();
        let cache: IntelligentCache<u32, u32> = IntelligentCache::new(
            "bounded",
            CacheConfig::default()
                .with_max_size_bytes(1_000)
                .with_max_entries(8)
                .with_eviction_policy(policy),
            registry.clone(),
        );

        for (key, size, critical) in puts {
            let priority = if critical { Priority::Critical } else { Priority::Low };
            cache.put_with(key, key, priority, Some(size));

            prop_assert!(cache.size_bytes() <= 1_000);
            prop_assert!(cache.len() <= 8);
            prop_assert_eq!(registry.current_size(), cache.size_bytes());
        }
    }

    /// Property: a put followed by a get returns the value
    #[test]
    fn test_put_then_get_returns_value(key in any::<u16>(), value in any::<u64>(), size in 1u64..1_000) {
        let cache: IntelligentCache<u16, u64> =
            IntelligentCache::new("roundtrip", CacheConfig::default(), registry());

        cache.put_with(key, value, Priority::Normal, Some(size));
        prop_assert_eq!(cache.get(&key), Some(value));
    }
}
