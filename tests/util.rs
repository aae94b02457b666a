use std::sync::Arc;

use provkit::cert::params::SubjectDescriptor;
use provkit::identity::{IdentityIssuer, IssuanceConfig};
use provkit::keystore::KdfParams;
use provkit::logging::NullSink;

/// Issuer with 2048-bit keys and cheap Argon2 costs.
pub fn fast_issuer() -> IdentityIssuer {
    let config = IssuanceConfig::builder()
        .key_bits(2048)
        .kdf(KdfParams::builder().m_cost(1024).t_cost(1).build())
        .build();
    IdentityIssuer::new(config, Arc::new(NullSink))
}

pub fn full_subject(common_name: &str) -> SubjectDescriptor {
    SubjectDescriptor::builder()
        .country("FR")
        .organization("Shiyatsu")
        .organization_unit("Yatsu")
        .locality("Paris")
        .state("France")
        .common_name(common_name)
        .email("shiyatsu@shiyatsu.com")
        .build()
}
