//! Cached-network file format (§6, §9), grounded in `EthosNCaching.cpp`'s
//! `SaveCachedSubgraphs`/`LoadCachedSubgraphs`. The layout is kept but every field is pinned to a
//! fixed 32-bit little-endian width (§9's explicit recommendation), instead of the original's
//! platform `size_t`, so the file is portable across host architectures.
//!
//! Wire layout: `u32 num_subgraphs`, then `u32` per-subgraph compiled size (blob bytes + 4 for the
//! trailing intermediate-size field), then `u32` per-subgraph index, then for each subgraph in
//! order: the compiled blob followed by a `u32` intermediate-buffer size.

use std::io::{Read, Write};

use crate::error::{NpuError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedNetwork {
    pub compiled_network: Vec<u8>,
    pub intermediate_data_size: u32,
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| NpuError::CacheFormat("unexpected end of file".into()))?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Serialises subgraphs in ascending subgraph-index order, matching the original's `std::map`
/// iteration order (keys sorted).
pub fn save<W: Write>(mut out: W, networks: &std::collections::BTreeMap<u32, CachedNetwork>) -> Result<()> {
    write_u32(&mut out, networks.len() as u32)?;
    for net in networks.values() {
        let compiled_size = net.compiled_network.len() as u32 + 4;
        write_u32(&mut out, compiled_size)?;
    }
    for idx in networks.keys() {
        write_u32(&mut out, *idx)?;
    }
    for net in networks.values() {
        out.write_all(&net.compiled_network)?;
        write_u32(&mut out, net.intermediate_data_size)?;
    }
    Ok(())
}

/// Deserialises a cached-network file, rejecting truncation and trailing bytes (§6: "must handle
/// a truncated or empty file as failure without partial state").
pub fn load<R: Read>(mut input: R) -> Result<std::collections::BTreeMap<u32, CachedNetwork>> {
    let num_subgraphs = read_u32(&mut input)?;

    let mut sizes = Vec::with_capacity(num_subgraphs as usize);
    for _ in 0..num_subgraphs {
        let size = read_u32(&mut input)?;
        if size < 4 {
            return Err(NpuError::CacheFormat("compiled network size smaller than the trailing size field".into()));
        }
        sizes.push(size);
    }

    let mut indices = Vec::with_capacity(num_subgraphs as usize);
    for _ in 0..num_subgraphs {
        indices.push(read_u32(&mut input)?);
    }

    let mut networks = std::collections::BTreeMap::new();
    for i in 0..num_subgraphs as usize {
        let compiled_size = (sizes[i] - 4) as usize;
        let mut compiled_network = vec![0u8; compiled_size];
        input.read_exact(&mut compiled_network).map_err(|_| NpuError::CacheFormat(format!("truncated subgraph {i}")))?;
        let intermediate_data_size = read_u32(&mut input)?;
        networks.insert(indices[i], CachedNetwork { compiled_network, intermediate_data_size });
    }

    let mut trailing = [0u8; 1];
    if input.read(&mut trailing)? != 0 {
        return Err(NpuError::CacheFormat("leftover data in cached network file".into()));
    }

    Ok(networks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> std::collections::BTreeMap<u32, CachedNetwork> {
        let mut networks = std::collections::BTreeMap::new();
        networks.insert(0, CachedNetwork { compiled_network: vec![1, 2, 3, 4, 5], intermediate_data_size: 1024 });
        networks.insert(2, CachedNetwork { compiled_network: vec![], intermediate_data_size: 0 });
        networks
    }

    #[test]
    fn round_trips_multiple_subgraphs() {
        let networks = sample();
        let mut buf = Vec::new();
        save(&mut buf, &networks).unwrap();
        let loaded = load(&buf[..]).unwrap();
        assert_eq!(loaded, networks);
    }

    #[test]
    fn empty_file_fails_without_partial_state() {
        let err = load(&[][..]).unwrap_err();
        assert!(matches!(err, NpuError::CacheFormat(_)));
    }

    #[test]
    fn truncated_file_fails() {
        let networks = sample();
        let mut buf = Vec::new();
        save(&mut buf, &networks).unwrap();
        buf.truncate(buf.len() - 3);
        let err = load(&buf[..]).unwrap_err();
        assert!(matches!(err, NpuError::CacheFormat(_)));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let networks = sample();
        let mut buf = Vec::new();
        save(&mut buf, &networks).unwrap();
        buf.push(0xFF);
        let err = load(&buf[..]).unwrap_err();
        assert!(matches!(err, NpuError::CacheFormat(_)));
    }
}
