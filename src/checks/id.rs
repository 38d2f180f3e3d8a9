use thiserror::Error;

/// Check and tenant ids share one global id space so a single probe can carry
/// checks from multiple regions. A *local* id is positive and only meaningful
/// within its region; a *global* id is negative and encodes both: the sign is
/// the type tag, so the two can never be confused at runtime.
///
/// `global = -(local * 1000 + region)`.
pub const BAD_ID: i64 = 0;

pub const MIN_LOCAL_ID: i64 = 1;
pub const MAX_LOCAL_ID: i64 = i64::MAX / 1000 - 1;

pub const MIN_REGION_ID: i32 = 1;
pub const MAX_REGION_ID: i32 = 999;

/// The most negative representable global id,
/// `local_to_global(MAX_LOCAL_ID, MAX_REGION_ID)`.
pub const MIN_GLOBAL_ID: i64 = -(MAX_LOCAL_ID * 1000 + MAX_REGION_ID as i64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid local id {0}")]
    InvalidLocalId(i64),
    #[error("invalid region id {0}")]
    InvalidRegionId(i32),
    #[error("invalid global id {0}")]
    InvalidGlobalId(i64),
}

pub fn is_local(id: i64) -> bool {
    (MIN_LOCAL_ID..=MAX_LOCAL_ID).contains(&id)
}

pub fn is_global(id: i64) -> bool {
    (MIN_GLOBAL_ID..0).contains(&id) && global_to_local(id).is_ok()
}

/// Packs a (local, region) pair into the global id space.
pub fn local_to_global(local_id: i64, region_id: i32) -> Result<i64, IdError> {
    if !is_local(local_id) {
        return Err(IdError::InvalidLocalId(local_id));
    }
    if !(MIN_REGION_ID..=MAX_REGION_ID).contains(&region_id) {
        return Err(IdError::InvalidRegionId(region_id));
    }
    Ok(-(local_id * 1000 + i64::from(region_id)))
}

/// Unpacks a global id into its (local, region) pair.
pub fn global_to_local(global_id: i64) -> Result<(i64, i32), IdError> {
    if global_id >= 0 {
        return Err(IdError::InvalidGlobalId(global_id));
    }
    let positive = -global_id;
    let local_id = positive / 1000;
    let region_id = (positive % 1000) as i32;
    if !is_local(local_id) {
        return Err(IdError::InvalidGlobalId(global_id));
    }
    if !(MIN_REGION_ID..=MAX_REGION_ID).contains(&region_id) {
        return Err(IdError::InvalidGlobalId(global_id));
    }
    Ok((local_id, region_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::minimum(MIN_LOCAL_ID, MIN_REGION_ID)]
    #[case::maximum(MAX_LOCAL_ID, MAX_REGION_ID)]
    #[case::mixed(42, 3)]
    #[case::region_boundary(7, MAX_REGION_ID)]
    fn round_trip(#[case] local_id: i64, #[case] region_id: i32) {
        let global_id = local_to_global(local_id, region_id).unwrap();
        assert!(global_id < 0);
        assert_eq!(global_to_local(global_id).unwrap(), (local_id, region_id));
    }

    #[test]
    fn boundary_values() {
        assert_eq!(
            local_to_global(MAX_LOCAL_ID, MAX_REGION_ID).unwrap(),
            MIN_GLOBAL_ID
        );
        assert_eq!(
            global_to_local(MIN_GLOBAL_ID).unwrap(),
            (MAX_LOCAL_ID, MAX_REGION_ID)
        );
    }

    #[rstest]
    #[case::zero_local(0, 1)]
    #[case::negative_local(-5, 1)]
    #[case::local_too_big(MAX_LOCAL_ID + 1, 1)]
    fn invalid_local(#[case] local_id: i64, #[case] region_id: i32) {
        assert_eq!(
            local_to_global(local_id, region_id),
            Err(IdError::InvalidLocalId(local_id))
        );
    }

    #[rstest]
    #[case::zero_region(1, 0)]
    #[case::negative_region(1, -1)]
    #[case::region_too_big(1, MAX_REGION_ID + 1)]
    fn invalid_region(#[case] local_id: i64, #[case] region_id: i32) {
        assert_eq!(
            local_to_global(local_id, region_id),
            Err(IdError::InvalidRegionId(region_id))
        );
    }

    #[rstest]
    #[case::zero(BAD_ID)]
    #[case::local_passed_as_global(42)]
    #[case::zero_region_encoded(-1000)]
    #[case::zero_local_encoded(-999)]
    fn invalid_global(#[case] global_id: i64) {
        assert_eq!(
            global_to_local(global_id),
            Err(IdError::InvalidGlobalId(global_id))
        );
    }

    #[test]
    fn ids_are_disjoint_by_sign() {
        for local_id in [MIN_LOCAL_ID, 12345, MAX_LOCAL_ID] {
            assert!(is_local(local_id));
            assert!(!is_global(local_id));
            let global_id = local_to_global(local_id, 7).unwrap();
            assert!(is_global(global_id));
            assert!(!is_local(global_id));
        }
        assert!(!is_local(BAD_ID));
        assert!(!is_global(BAD_ID));
    }
}
