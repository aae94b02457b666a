use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, Ia5StringRef, PrintableStringRef, SetOfVec};
use der::Tag;
use time::{Duration, OffsetDateTime};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{ProvKitError, Result};
use crate::key::PublicKey;

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name fields of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: SubjectDescriptor,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name attributes, in the order they are written into a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnAttribute {
    Country,
    Organization,
    OrganizationalUnit,
    Locality,
    StateOrProvince,
    CommonName,
    EmailAddress,
}

impl DnAttribute {
    pub const ORDER: [DnAttribute; 7] = [
        DnAttribute::Country,
        DnAttribute::Organization,
        DnAttribute::OrganizationalUnit,
        DnAttribute::Locality,
        DnAttribute::StateOrProvince,
        DnAttribute::CommonName,
        DnAttribute::EmailAddress,
    ];

    pub fn oid(self) -> ObjectIdentifier {
        match self {
            DnAttribute::Country => ObjectIdentifier::new_unwrap("2.5.4.6"),
            DnAttribute::Organization => ObjectIdentifier::new_unwrap("2.5.4.10"),
            DnAttribute::OrganizationalUnit => ObjectIdentifier::new_unwrap("2.5.4.11"),
            DnAttribute::Locality => ObjectIdentifier::new_unwrap("2.5.4.7"),
            DnAttribute::StateOrProvince => ObjectIdentifier::new_unwrap("2.5.4.8"),
            DnAttribute::CommonName => ObjectIdentifier::new_unwrap("2.5.4.3"),
            DnAttribute::EmailAddress => ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1"),
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        Self::ORDER.into_iter().find(|attr| attr.oid() == *oid)
    }

    /// Encodes `value` with the string type X.520 expects for the attribute.
    fn encode_value(self, value: &str) -> der::Result<Any> {
        match self {
            DnAttribute::Country => {
                PrintableStringRef::new(value)?;
                Any::new(Tag::PrintableString, value.as_bytes())
            }
            DnAttribute::EmailAddress => {
                Ia5StringRef::new(value)?;
                Any::new(Tag::Ia5String, value.as_bytes())
            }
            _ => Any::new(Tag::Utf8String, value.as_bytes()),
        }
    }
}

/// Subject fields of a certificate request.
///
/// Every field is optional. Blank values (empty or whitespace only) are
/// treated as absent and left out of the encoded name.
///
/// # Fields
/// * `country` - The country (C).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
/// * `locality` - The locality or city (L).
/// * `state` - The state or province (ST).
/// * `common_name` - The common name (CN). Also used for the subjectAltName.
/// * `email` - The email address (emailAddress).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct SubjectDescriptor {
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organization_unit: Option<String>,
    #[builder(into)]
    pub locality: Option<String>,
    #[builder(into)]
    pub state: Option<String>,
    #[builder(into)]
    pub common_name: Option<String>,
    #[builder(into)]
    pub email: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl SubjectDescriptor {
    pub fn get(&self, attr: DnAttribute) -> Option<&str> {
        let value = match attr {
            DnAttribute::Country => &self.country,
            DnAttribute::Organization => &self.organization,
            DnAttribute::OrganizationalUnit => &self.organization_unit,
            DnAttribute::Locality => &self.locality,
            DnAttribute::StateOrProvince => &self.state,
            DnAttribute::CommonName => &self.common_name,
            DnAttribute::EmailAddress => &self.email,
        };
        non_blank(value)
    }

    fn slot(&mut self, attr: DnAttribute) -> &mut Option<String> {
        match attr {
            DnAttribute::Country => &mut self.country,
            DnAttribute::Organization => &mut self.organization,
            DnAttribute::OrganizationalUnit => &mut self.organization_unit,
            DnAttribute::Locality => &mut self.locality,
            DnAttribute::StateOrProvince => &mut self.state,
            DnAttribute::CommonName => &mut self.common_name,
            DnAttribute::EmailAddress => &mut self.email,
        }
    }

    /// The common name, if present and not blank.
    pub fn common_name(&self) -> Option<&str> {
        self.get(DnAttribute::CommonName)
    }

    /// Non-blank fields in name order.
    pub fn present_fields(&self) -> impl Iterator<Item = (DnAttribute, &str)> {
        DnAttribute::ORDER
            .into_iter()
            .filter_map(|attr| self.get(attr).map(|value| (attr, value)))
    }

    /// Converts the descriptor to an X.509 name with one attribute per RDN.
    pub fn as_x509_name(&self) -> Result<Name> {
        let rdns = self
            .present_fields()
            .map(|(attr, value)| {
                let atv = AttributeTypeAndValue {
                    oid: attr.oid(),
                    value: attr.encode_value(value)?,
                };
                Ok::<_, der::Error>(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
            })
            .collect::<der::Result<Vec<_>>>()
            .map_err(|e| ProvKitError::issuance("invalid subject name").with_source(e))?;
        Ok(RdnSequence(rdns))
    }

    /// Reads the known attributes back out of an X.509 name.
    ///
    /// Unknown attributes are ignored.
    pub fn from_x509_name(name: &Name) -> Self {
        let mut descriptor = SubjectDescriptor::default();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let Some(attr) = DnAttribute::from_oid(&atv.oid) else {
                    continue;
                };
                if let Ok(value) = std::str::from_utf8(atv.value.value()) {
                    *descriptor.slot(attr) = Some(value.to_string());
                }
            }
        }
        descriptor
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// Window for a freshly issued certificate: starts `backdate` before `now`
    /// and ends `years` calendar years after it.
    pub fn backdated(now: OffsetDateTime, backdate: Duration, years: i32) -> Result<Self> {
        let not_after = add_years(now, years)
            .map_err(|e| ProvKitError::issuance("validity end out of range").with_source(e))?;
        Ok(Self {
            not_before: now - backdate,
            not_after,
        })
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// Adds calendar years, moving 29 February to the 28th when needed.
fn add_years(
    t: OffsetDateTime,
    years: i32,
) -> std::result::Result<OffsetDateTime, time::error::ComponentRange> {
    let year = t.year() + years;
    t.replace_year(year)
        .or_else(|_| t.replace_day(28).and_then(|t| t.replace_year(year)))
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}
