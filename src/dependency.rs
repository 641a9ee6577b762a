//! The dependency model (spec.md §4.5): a many-to-many relation between stripes of two agents,
//! and the three stripe-id functions the scheduler uses to enforce ordering.

/// Ratio in the number of stripes of `self`/`other` needed by the other/this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DependencyRatio {
    pub self_: u16,
    pub other: u16,
}

/// A dependency declared by one agent on another. Exactly one of `outer_ratio.self_` /
/// `outer_ratio.other` is the larger value; `inner_ratio` approximates the same ratio at stripe
/// granularity, with `boundary` carrying the leftover from kernel/pooling-window overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub other_agent_id: u32,
    pub outer_ratio: DependencyRatio,
    pub inner_ratio: DependencyRatio,
    pub boundary: i8,
    /// Size of the tile this dependency's write-after-read relation guards, or `None` if this is
    /// not a write dependency.
    pub writes_to_tile_size: Option<u16>,
    pub use_for_scheduling: bool,
    pub use_for_command_stream: bool,
}

impl Dependency {
    pub fn new(other_agent_id: u32, outer_ratio: DependencyRatio, inner_ratio: DependencyRatio, boundary: i8) -> Self {
        Self {
            other_agent_id,
            outer_ratio,
            inner_ratio,
            boundary,
            writes_to_tile_size: None,
            use_for_scheduling: true,
            use_for_command_stream: true,
        }
    }
}

fn clamp(v: i64, lo: i64, hi: i64) -> i64 {
    v.max(lo).min(hi)
}

/// First stripe of the other agent that reads stripe `x` of the owning agent.
pub fn get_first_reader_stripe_id(dep: &Dependency, x: u32) -> i64 {
    if x == 0 {
        return 0;
    }
    let outer_self = dep.outer_ratio.self_ as i64;
    let outer_other = dep.outer_ratio.other as i64;
    let inner_self = dep.inner_ratio.self_.max(1) as i64;
    let inner_other = dep.inner_ratio.other as i64;
    let x = x as i64;

    let outer = outer_other * (x / outer_self.max(1));
    let mut inner = (x % outer_self.max(1)) - dep.boundary as i64;
    inner = inner_other * (inner / inner_self);
    inner = clamp(inner, 0, outer_other - 1);

    outer + inner
}

/// Largest stripe of the other agent (a producer, up the sequence) that must be complete before
/// stripe `x` of the owning agent can start ("read-after-write" wait target).
pub fn get_largest_needed_stripe_id(dep: &Dependency, x: u32) -> i64 {
    let outer_self = dep.outer_ratio.self_ as i64;
    let outer_other = dep.outer_ratio.other as i64;
    let inner_self = dep.inner_ratio.self_.max(1) as i64;
    let inner_other = dep.inner_ratio.other as i64;
    let x = x as i64;

    let outer = outer_other * (x / outer_self.max(1));
    let mut inner = x % outer_self.max(1);
    inner = inner_other * (inner / inner_self);
    inner = inner + inner_other - 1 + dep.boundary as i64;
    inner = clamp(inner, 0, outer_other - 1);

    outer + inner
}

/// Last stripe of the other agent (a reader, down the sequence) that uses stripe `x` of the
/// owning agent ("write-after-read" eviction wait target).
pub fn get_last_reader_stripe_id(dep: &Dependency, x: u32) -> i64 {
    let outer_self = dep.outer_ratio.self_ as i64;
    let outer_other = dep.outer_ratio.other as i64;
    let inner_self = dep.inner_ratio.self_.max(1) as i64;
    let inner_other = dep.inner_ratio.other as i64;
    let x = x as i64;

    let outer = outer_other * (x / outer_self.max(1));
    let mut inner = (x % outer_self.max(1)) + dep.boundary as i64;
    inner = inner_other * (inner / inner_self);
    inner = inner + inner_other - 1;
    inner = clamp(inner, 0, outer_other - 1);

    outer + inner
}

/// The reader of the stripe that used to occupy slot `x` before it gets evicted by a write at
/// stripe `x`, i.e. `GetLastReaderStripeId(dep, x - tileSize)`.
pub fn get_last_reader_of_evicted_stripe_id(dep: &Dependency, x: u32, tile_size: u32) -> i64 {
    debug_assert!(x >= tile_size);
    get_last_reader_stripe_id(dep, x - tile_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(outer_self: u16, outer_other: u16, inner_self: u16, inner_other: u16, boundary: i8) -> Dependency {
        Dependency::new(
            0,
            DependencyRatio { self_: outer_self, other: outer_other },
            DependencyRatio { self_: inner_self, other: inner_other },
            boundary,
        )
    }

    #[test]
    fn one_to_one_dependency_is_identity() {
        let d = dep(1, 1, 1, 1, 0);
        for x in 0..5u32 {
            assert_eq!(get_largest_needed_stripe_id(&d, x), x as i64);
            assert_eq!(get_first_reader_stripe_id(&d, x), x as i64);
            assert_eq!(get_last_reader_stripe_id(&d, x), x as i64);
        }
    }

    #[test]
    fn monotonicity_holds_across_a_ratio() {
        // Two MCE stripes consume each IFM stripe (3x3 conv boundary=1 style ratio).
        let d = dep(1, 2, 1, 2, 1);
        let mut prev_first = i64::MIN;
        let mut prev_last = i64::MIN;
        for x in 0..8u32 {
            let first = get_first_reader_stripe_id(&d, x);
            let last = get_last_reader_stripe_id(&d, x);
            assert!(first <= last);
            assert!(last <= d.outer_ratio.other as i64 - 1);
            assert!(first >= prev_first);
            assert!(last >= prev_last);
            prev_first = first;
            prev_last = last;
        }
    }

    #[test]
    fn eviction_lookup_uses_shifted_stripe() {
        let d = dep(1, 1, 1, 1, 0);
        assert_eq!(get_last_reader_of_evicted_stripe_id(&d, 4, 2), get_last_reader_stripe_id(&d, 2));
    }
}
