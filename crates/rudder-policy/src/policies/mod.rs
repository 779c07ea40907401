//! Built-in policies

pub mod abuse;
pub mod compliance;
pub mod owner_lock;
pub mod safety;

pub use abuse::AbusePolicy;
pub use compliance::CompliancePolicy;
pub use owner_lock::OwnerLockPolicy;
pub use safety::SafetyPolicy;
