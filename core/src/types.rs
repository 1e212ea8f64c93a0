//! Shared primitive types used across the core.

/// A roster member's stable identifier.
pub type StaffId = String;

/// A branch code, e.g. "BR-001".
pub type BranchCode = String;

/// A stable, unique identifier for any persisted entity.
pub type EntityId = String;

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// New random entity id.
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::round2;

    #[test]
    fn rounds_half_up_at_two_places() {
        assert_eq!(round2(10.625), 10.63);
        assert_eq!(round2(1.004), 1.0);
        assert_eq!(round2(333.333_333), 333.33);
        assert_eq!(round2(0.0), 0.0);
    }
}
