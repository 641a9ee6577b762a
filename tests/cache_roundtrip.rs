//! Cache round-trip property (§8 invariant 7) and the concrete E5 scenario.

use std::collections::BTreeMap;

use npu_cmdstream::cache::{self, CachedNetwork};

#[test]
fn e5_single_subgraph_round_trips_exactly() {
    let mut networks = BTreeMap::new();
    networks.insert(0, CachedNetwork { compiled_network: vec![10, 11, 12, 13, 14], intermediate_data_size: 11 });

    let mut buf = Vec::new();
    cache::save(&mut buf, &networks).unwrap();
    let loaded = cache::load(&buf[..]).unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[&0].compiled_network, vec![10, 11, 12, 13, 14]);
    assert_eq!(loaded[&0].intermediate_data_size, 11);
}

#[test]
fn many_subgraphs_with_arbitrary_bytes_round_trip() {
    let mut networks = BTreeMap::new();
    networks.insert(0, CachedNetwork { compiled_network: (0..200u32).map(|v| v as u8).collect(), intermediate_data_size: 4096 });
    networks.insert(5, CachedNetwork { compiled_network: vec![], intermediate_data_size: 0 });
    networks.insert(3, CachedNetwork { compiled_network: vec![0xFF; 7], intermediate_data_size: u32::MAX });

    let mut buf = Vec::new();
    cache::save(&mut buf, &networks).unwrap();
    let loaded = cache::load(&buf[..]).unwrap();
    assert_eq!(loaded, networks);
}

#[test]
fn empty_file_is_a_failure_not_an_empty_cache() {
    assert!(cache::load(&[][..]).is_err());
}

#[test]
fn truncated_file_is_a_failure() {
    let mut networks = BTreeMap::new();
    networks.insert(0, CachedNetwork { compiled_network: vec![1, 2, 3, 4], intermediate_data_size: 9 });
    let mut buf = Vec::new();
    cache::save(&mut buf, &networks).unwrap();
    let half = buf.len() / 2;
    assert!(cache::load(&buf[..half]).is_err());
}
