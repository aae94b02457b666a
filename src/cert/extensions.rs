use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::{ProvKitError, Result};

/// Trait for converting to and from X.509 extensions.
///
/// # Example
/// ```
/// use provkit::cert::extensions::{SanEntry, SubjectAltName, ToAndFromX509Extension};
/// let san = SubjectAltName { names: vec![SanEntry::for_host("example.com")] };
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san.names, decoded.names);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// One identity listed in a subjectAltName.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(IpAddr),
}

impl SanEntry {
    /// An iPAddress entry if `host` is an IPv4 or IPv6 literal, otherwise a
    /// dNSName entry.
    pub fn for_host(host: &str) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => SanEntry::Ip(ip),
            Err(_) => SanEntry::Dns(host.to_string()),
        }
    }

    fn to_general_name(&self) -> Result<GeneralName> {
        match self {
            SanEntry::Dns(name) => Ia5String::try_from(name.clone())
                .map(GeneralName::DnsName)
                .map_err(|e| ProvKitError::issuance(format!("invalid DNS name {name:?}")).with_source(e)),
            SanEntry::Ip(ip) => {
                let octets = match ip {
                    IpAddr::V4(v4) => v4.octets().to_vec(),
                    IpAddr::V6(v6) => v6.octets().to_vec(),
                };
                Ok(GeneralName::IpAddress(OctetString::new(octets)?))
            }
        }
    }

    fn from_general_name(name: &GeneralName) -> Result<Self> {
        match name {
            GeneralName::DnsName(dns) => Ok(SanEntry::Dns(dns.to_string())),
            GeneralName::IpAddress(octets) => match octets.as_bytes() {
                [a, b, c, d] => Ok(SanEntry::Ip(IpAddr::V4(Ipv4Addr::new(*a, *b, *c, *d)))),
                bytes => <[u8; 16]>::try_from(bytes)
                    .map(|v6| SanEntry::Ip(IpAddr::V6(Ipv6Addr::from(v6))))
                    .map_err(|_| ProvKitError::issuance("iPAddress must be 4 or 16 bytes")),
            },
            _ => Err(ProvKitError::issuance("Unsupported general name type")),
        }
    }
}

/// Represents the Subject Alternative Name (SAN) extension.
///
/// # Fields
/// * `names` - DNS names and IP addresses the certificate is valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAltName {
    pub names: Vec<SanEntry>,
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(SanEntry::to_general_name)
                .collect::<Result<Vec<_>>>()?,
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .map(SanEntry::from_general_name)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }
}
