//! MAC integrity protection for encrypted documents
//!
//! A standalone MAC is stored in the trailer `/AuthCode` dictionary and
//! covers every byte of the file except the MAC value itself. The MAC key is
//! random, wrapped with AES-256 key wrap under a key derived by HKDF-SHA-256
//! from the file encryption key and the `/KDFSalt` of the encryption
//! dictionary.
//!
//! Only PDF 2.0 documents using encryption of version 5 or higher can be
//! protected, and the FIPS provider refuses the HKDF step.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, StringFormat};
use tracing::{debug, info};

use pades_crypto::{CryptoError, CryptoProvider, DigestAlgorithm};
use pades_pdf::document::{find_from, find_last_occurrence};
use pades_pdf::incremental::write_document;
use pades_pdf::signer::{replace_byte_range, BYTE_RANGE_PLACEHOLDER};

use crate::error::{PadesError, Result};

/// HKDF info string for the key-wrapping key
const MAC_KDF_INFO: &[u8] = b"PDFMAC";
const KDF_SALT_LEN: usize = 32;
const MAC_KEY_LEN: usize = 32;
/// HMAC-SHA-256 output
const MAC_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub const PDF_1_7: PdfVersion = PdfVersion::new(1, 7);
    pub const PDF_2_0: PdfVersion = PdfVersion::new(2, 0);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse a header version such as `1.7`
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.trim().split_once('.')?;
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Encryption algorithm, by the `/V` value of the encryption dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    Rc4_40,
    Rc4_128,
    Aes128,
    Aes256,
}

impl EncryptionAlgorithm {
    pub fn version(self) -> u8 {
        match self {
            Self::Rc4_40 => 1,
            Self::Rc4_128 => 2,
            Self::Aes128 => 4,
            Self::Aes256 => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionScheme {
    /// Password-based, `/Filter /Standard`
    Standard,
    /// Certificate-based, `/Filter /Adobe.PubSec`
    PublicKey,
}

impl EncryptionScheme {
    fn filter(self) -> &'static [u8] {
        match self {
            Self::Standard => b"Standard",
            Self::PublicKey => b"Adobe.PubSec",
        }
    }
}

/// How the document is encrypted, as known to the writer
#[derive(Clone)]
pub struct EncryptionSettings {
    pub scheme: EncryptionScheme,
    pub algorithm: EncryptionAlgorithm,
    /// File encryption key
    pub file_key: Vec<u8>,
}

impl fmt::Debug for EncryptionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionSettings")
            .field("scheme", &self.scheme)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl EncryptionSettings {
    pub fn standard(algorithm: EncryptionAlgorithm, file_key: Vec<u8>) -> Self {
        Self {
            scheme: EncryptionScheme::Standard,
            algorithm,
            file_key,
        }
    }

    pub fn public_key(algorithm: EncryptionAlgorithm, file_key: Vec<u8>) -> Self {
        Self {
            scheme: EncryptionScheme::PublicKey,
            algorithm,
            file_key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacDigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl MacDigestAlgorithm {
    pub fn digest_algorithm(self) -> DigestAlgorithm {
        match self {
            Self::Sha256 => DigestAlgorithm::Sha256,
            Self::Sha384 => DigestAlgorithm::Sha384,
            Self::Sha512 => DigestAlgorithm::Sha512,
        }
    }

    fn pdf_name(self) -> &'static [u8] {
        match self {
            Self::Sha256 => b"SHA256",
            Self::Sha384 => b"SHA384",
            Self::Sha512 => b"SHA512",
        }
    }

    fn from_pdf_name(name: &[u8]) -> Option<Self> {
        [Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.pdf_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacAlgorithm {
    #[default]
    HmacWithSha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyWrappingAlgorithm {
    #[default]
    Aes256NoPadd,
}

/// Algorithms used for MAC protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacProperties {
    pub digest: MacDigestAlgorithm,
    pub mac_algorithm: MacAlgorithm,
    pub key_wrapping: KeyWrappingAlgorithm,
}

impl MacProperties {
    pub fn new(
        digest: MacDigestAlgorithm,
        mac_algorithm: MacAlgorithm,
        key_wrapping: KeyWrappingAlgorithm,
    ) -> Self {
        Self {
            digest,
            mac_algorithm,
            key_wrapping,
        }
    }
}

/// Computes and embeds the MAC of one encrypted document
pub struct MacIntegrityProtector {
    provider: Arc<dyn CryptoProvider>,
    properties: MacProperties,
    version: PdfVersion,
    scheme: EncryptionScheme,
    salt: Vec<u8>,
    mac_key: Vec<u8>,
    wrapped_key: Vec<u8>,
}

impl MacIntegrityProtector {
    /// Check the version gates and derive the MAC keys.
    ///
    /// Fails before any output is produced when the document version is
    /// below 2.0, the encryption is older than version 5, or the provider
    /// cannot run HKDF.
    pub fn new(
        provider: Arc<dyn CryptoProvider>,
        version: PdfVersion,
        encryption: &EncryptionSettings,
        properties: MacProperties,
    ) -> Result<Self> {
        if version < PdfVersion::PDF_2_0 {
            return Err(PadesError::Domain(
                "MAC integrity protection is only supported for PDF 2.0 or higher.".to_string(),
            ));
        }
        if encryption.algorithm.version() < 5 {
            return Err(PadesError::Domain(
                "MAC integrity protection is only supported for encryption algorithms of version 5 or higher."
                    .to_string(),
            ));
        }

        let salt = provider.random_bytes(KDF_SALT_LEN);
        let kek = provider.hkdf_sha256(&encryption.file_key, &salt, MAC_KDF_INFO, 32)?;
        let mac_key = provider.random_bytes(MAC_KEY_LEN);
        let wrapped_key = match properties.key_wrapping {
            KeyWrappingAlgorithm::Aes256NoPadd => provider.aes_key_wrap(&kek, &mac_key)?,
        };
        debug!(provider = provider.name(), ?properties, "derived MAC keys");

        Ok(Self {
            provider,
            properties,
            version,
            scheme: encryption.scheme,
            salt,
            mac_key,
            wrapped_key,
        })
    }

    /// Write `doc` to `output` with a standalone MAC in its trailer
    pub fn protect<W: Write>(&self, doc: &mut Document, mut output: W) -> Result<W> {
        self.add_kdf_salt(doc)?;
        doc.version = self.version.to_string();

        let auth_code = Dictionary::from_iter(vec![
            ("MACLocation", Object::Name(b"Standalone".to_vec())),
            (
                "ByteRange",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(BYTE_RANGE_PLACEHOLDER),
                    Object::Integer(BYTE_RANGE_PLACEHOLDER),
                    Object::Integer(BYTE_RANGE_PLACEHOLDER),
                ]),
            ),
            ("MAC", Object::String(vec![0; MAC_LEN], StringFormat::Hexadecimal)),
            (
                "MACKey",
                Object::String(self.wrapped_key.clone(), StringFormat::Hexadecimal),
            ),
            ("MACDigest", Object::Name(self.properties.digest.pdf_name().to_vec())),
        ]);
        doc.trailer.set("AuthCode", auth_code);

        let mut bytes = write_document(doc).bytes;
        let auth = find_last_occurrence(&bytes, b"/AuthCode")
            .ok_or_else(|| PadesError::Domain("AuthCode not written".to_string()))?;
        let mac_start = find_from(&bytes, b"/MAC <", auth)
            .map(|pos| pos + b"/MAC ".len())
            .ok_or_else(|| PadesError::Domain("MAC placeholder not written".to_string()))?;
        let mac_end = mac_start + MAC_LEN * 2 + 2;

        let byte_range = [0, mac_start, mac_end, bytes.len() - mac_end];
        replace_byte_range(&mut bytes, auth, &byte_range)?;

        let mac = compute_mac(
            self.provider.as_ref(),
            self.properties.digest,
            &self.mac_key,
            &bytes[..mac_start],
            &bytes[mac_end..],
        )?;
        bytes[mac_start + 1..mac_end - 1].copy_from_slice(hex::encode_upper(&mac).as_bytes());

        output.write_all(&bytes)?;
        output.flush()?;
        info!(bytes = bytes.len(), ?byte_range, "wrote MAC-protected document");
        Ok(output)
    }

    /// Recompute the MAC of a protected document.
    ///
    /// `Ok(false)` means the bytes or the key do not match the stored MAC.
    pub fn validate(provider: &dyn CryptoProvider, bytes: &[u8], file_key: &[u8]) -> Result<bool> {
        let auth = find_last_occurrence(bytes, b"/AuthCode")
            .ok_or_else(|| PadesError::Domain("document carries no MAC".to_string()))?;
        let [a, b, c, d] = read_byte_range(bytes, auth)?;
        let stored_mac = read_hex(bytes, b"/MAC <", auth)?;
        let wrapped_key = read_hex(bytes, b"/MACKey <", auth)?;
        let digest = read_name(bytes, b"/MACDigest /", auth)
            .and_then(MacDigestAlgorithm::from_pdf_name)
            .ok_or_else(|| PadesError::Domain("unsupported MAC digest".to_string()))?;
        let salt_pos = find_last_occurrence(bytes, b"/KDFSalt <")
            .ok_or_else(|| PadesError::Domain("encryption dictionary has no KDFSalt".to_string()))?;
        let salt = read_hex(bytes, b"/KDFSalt <", salt_pos)?;

        if a != 0 || b > c || c.checked_add(d) != Some(bytes.len()) {
            return Ok(false);
        }
        let (head, tail) = (&bytes[..b], &bytes[c..]);

        let kek = provider.hkdf_sha256(file_key, &salt, MAC_KDF_INFO, 32)?;
        let mac_key = match provider.aes_key_unwrap(&kek, &wrapped_key) {
            Ok(key) => key,
            Err(CryptoError::KeyWrap(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let expected = compute_mac(provider, digest, &mac_key, head, tail)?;
        Ok(expected == stored_mac)
    }

    /// Record the KDF salt in the encryption dictionary
    fn add_kdf_salt(&self, doc: &mut Document) -> Result<()> {
        let reference = match doc.trailer.get(b"Encrypt") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                return Err(PadesError::Domain(
                    "MAC integrity protection requires an encrypted document".to_string(),
                ))
            }
        };
        let encrypt = match reference {
            Some(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut),
            None => doc.trailer.get_mut(b"Encrypt").and_then(Object::as_dict_mut),
        }
        .map_err(|_| PadesError::Domain("invalid encryption dictionary".to_string()))?;

        let expected = self.scheme.filter();
        match encrypt.get(b"Filter").and_then(Object::as_name) {
            Ok(filter) if filter != expected => {
                return Err(PadesError::Domain(format!(
                    "encryption filter {} does not match {:?} encryption",
                    String::from_utf8_lossy(filter),
                    self.scheme
                )))
            }
            _ => {}
        }
        encrypt.set(
            "KDFSalt",
            Object::String(self.salt.clone(), StringFormat::Hexadecimal),
        );
        Ok(())
    }
}

/// HMAC-SHA-256 over the digest of the two covered ranges
fn compute_mac(
    provider: &dyn CryptoProvider,
    digest: MacDigestAlgorithm,
    mac_key: &[u8],
    head: &[u8],
    tail: &[u8],
) -> Result<Vec<u8>> {
    let mut hasher = provider.message_digest(digest.digest_algorithm())?;
    hasher.update(head);
    hasher.update(tail);
    let data_digest = hasher.finalize();
    Ok(provider.hmac_sha256(mac_key, &data_digest)?)
}

fn read_byte_range(bytes: &[u8], from: usize) -> Result<[usize; 4]> {
    let malformed = || PadesError::Domain("malformed MAC byte range".to_string());
    let start = find_from(bytes, b"/ByteRange", from).ok_or_else(malformed)?;
    let open = find_from(bytes, b"[", start).ok_or_else(malformed)?;
    let close = find_from(bytes, b"]", open).ok_or_else(malformed)?;
    let values: Vec<usize> = String::from_utf8_lossy(&bytes[open + 1..close])
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| malformed())?;
    values.try_into().map_err(|_| malformed())
}

/// Hex string following `marker`, which must end with `<`
fn read_hex(bytes: &[u8], marker: &[u8], from: usize) -> Result<Vec<u8>> {
    let missing = || {
        PadesError::Domain(format!(
            "missing {}",
            String::from_utf8_lossy(&marker[..marker.len() - 2])
        ))
    };
    let start = find_from(bytes, marker, from).ok_or_else(missing)? + marker.len();
    let end = find_from(bytes, b">", start).ok_or_else(missing)?;
    hex::decode(&bytes[start..end]).map_err(|_| missing())
}

fn read_name<'a>(bytes: &'a [u8], marker: &[u8], from: usize) -> Option<&'a [u8]> {
    let start = find_from(bytes, marker, from)? + marker.len();
    let len = bytes[start..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    Some(&bytes[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pades_crypto::{FipsProvider, GeneralProvider};
    use pades_pdf::testing::minimal_pdf;
    use pretty_assertions::assert_eq;
    use std::io;

    const FILE_KEY: [u8; 32] = [7; 32];

    fn general() -> Arc<dyn CryptoProvider> {
        Arc::new(GeneralProvider)
    }

    fn encrypted_document(filter: &[u8]) -> Document {
        let mut doc = Document::load_mem(&minimal_pdf("2.0", 1).unwrap()).unwrap();
        let encrypt = Dictionary::from_iter(vec![
            ("Filter", Object::Name(filter.to_vec())),
            ("V", Object::Integer(5)),
            ("R", Object::Integer(6)),
            ("Length", Object::Integer(256)),
        ]);
        let id = doc.add_object(encrypt);
        doc.trailer.set("Encrypt", Object::Reference(id));
        doc
    }

    fn aes256() -> EncryptionSettings {
        EncryptionSettings::standard(EncryptionAlgorithm::Aes256, FILE_KEY.to_vec())
    }

    fn protect(properties: MacProperties) -> Vec<u8> {
        let protector =
            MacIntegrityProtector::new(general(), PdfVersion::PDF_2_0, &aes256(), properties).unwrap();
        protector
            .protect(&mut encrypted_document(b"Standard"), Vec::new())
            .unwrap()
    }

    #[test]
    fn test_protect_and_validate() {
        let bytes = protect(MacProperties::default());
        assert!(bytes.starts_with(b"%PDF-2.0"));
        assert!(MacIntegrityProtector::validate(&GeneralProvider, &bytes, &FILE_KEY).unwrap());
    }

    #[test]
    fn test_all_digest_algorithms() {
        for digest in [
            MacDigestAlgorithm::Sha256,
            MacDigestAlgorithm::Sha384,
            MacDigestAlgorithm::Sha512,
        ] {
            let properties = MacProperties::new(
                digest,
                MacAlgorithm::HmacWithSha256,
                KeyWrappingAlgorithm::Aes256NoPadd,
            );
            let bytes = protect(properties);
            assert!(MacIntegrityProtector::validate(&GeneralProvider, &bytes, &FILE_KEY).unwrap());
        }
    }

    #[test]
    fn test_tampering_detected() {
        let mut bytes = protect(MacProperties::default());
        let pos = find_from(&bytes, b"(Page 1)", 0).unwrap();
        bytes[pos + 1] = b'Q';
        assert!(!MacIntegrityProtector::validate(&GeneralProvider, &bytes, &FILE_KEY).unwrap());
    }

    #[test]
    fn test_wrong_file_key() {
        let bytes = protect(MacProperties::default());
        assert!(!MacIntegrityProtector::validate(&GeneralProvider, &bytes, &[9; 32]).unwrap());
    }

    #[test]
    fn test_public_key_encryption() {
        let encryption =
            EncryptionSettings::public_key(EncryptionAlgorithm::Aes256, FILE_KEY.to_vec());
        let protector = MacIntegrityProtector::new(
            general(),
            PdfVersion::PDF_2_0,
            &encryption,
            MacProperties::default(),
        )
        .unwrap();
        let bytes = protector
            .protect(&mut encrypted_document(b"Adobe.PubSec"), Vec::new())
            .unwrap();
        assert!(MacIntegrityProtector::validate(&GeneralProvider, &bytes, &FILE_KEY).unwrap());

        // A password-protected dictionary does not match
        let err = protector
            .protect(&mut encrypted_document(b"Standard"), Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
    }

    #[test]
    fn test_unencrypted_document_rejected() {
        let protector = MacIntegrityProtector::new(
            general(),
            PdfVersion::PDF_2_0,
            &aes256(),
            MacProperties::default(),
        )
        .unwrap();
        let mut doc = Document::load_mem(&minimal_pdf("2.0", 1).unwrap()).unwrap();
        assert!(protector.protect(&mut doc, Vec::new()).is_err());
    }

    #[test]
    fn test_unwritable_stream() {
        struct Unwritable;

        impl Write for Unwritable {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "expected"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let protector = MacIntegrityProtector::new(
            general(),
            PdfVersion::PDF_2_0,
            &aes256(),
            MacProperties::default(),
        )
        .unwrap();
        let err = protector
            .protect(&mut encrypted_document(b"Standard"), Unwritable)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "expected");
    }

    #[test]
    fn test_old_version_rejected() {
        let err = MacIntegrityProtector::new(
            general(),
            PdfVersion::PDF_1_7,
            &aes256(),
            MacProperties::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert_eq!(
            err.to_string(),
            "MAC integrity protection is only supported for PDF 2.0 or higher."
        );
    }

    #[test]
    fn test_old_encryption_rejected() {
        let encryption = EncryptionSettings::standard(EncryptionAlgorithm::Aes128, FILE_KEY.to_vec());
        let err = MacIntegrityProtector::new(
            general(),
            PdfVersion::PDF_2_0,
            &encryption,
            MacProperties::default(),
        )
        .err()
        .unwrap();
        assert_eq!(
            err.to_string(),
            "MAC integrity protection is only supported for encryption algorithms of version 5 or higher."
        );
    }

    #[test]
    fn test_fips_rejects_hkdf() {
        let err = MacIntegrityProtector::new(
            Arc::new(FipsProvider),
            PdfVersion::PDF_2_0,
            &aes256(),
            MacProperties::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Security);
        assert_eq!(err.to_string(), "HKDF algorithm is not supported in FIPS mode.");
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(PdfVersion::parse("1.7"), Some(PdfVersion::PDF_1_7));
        assert_eq!(PdfVersion::parse(" 2.0\n"), Some(PdfVersion::PDF_2_0));
        assert_eq!(PdfVersion::parse("2"), None);
        assert_eq!(PdfVersion::PDF_2_0.to_string(), "2.0");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::error::ErrorKind;
    use pades_crypto::{FipsProvider, GeneralProvider};
    use proptest::prelude::*;

    fn algorithm() -> impl Strategy<Value = EncryptionAlgorithm> {
        prop_oneof![
            Just(EncryptionAlgorithm::Rc4_40),
            Just(EncryptionAlgorithm::Rc4_128),
            Just(EncryptionAlgorithm::Aes128),
            Just(EncryptionAlgorithm::Aes256),
        ]
    }

    proptest! {
        #[test]
        fn gates_follow_version_and_algorithm(
            major in 1u8..=3,
            minor in 0u8..=9,
            algorithm in algorithm(),
            fips in any::<bool>(),
        ) {
            let version = PdfVersion::new(major, minor);
            let provider: Arc<dyn CryptoProvider> = if fips {
                Arc::new(FipsProvider)
            } else {
                Arc::new(GeneralProvider)
            };
            let encryption = EncryptionSettings::standard(algorithm, vec![1; 32]);
            let result = MacIntegrityProtector::new(provider, version, &encryption, MacProperties::default());

            match result {
                Ok(_) => {
                    prop_assert!(version >= PdfVersion::PDF_2_0);
                    prop_assert!(algorithm.version() >= 5);
                    prop_assert!(!fips);
                }
                Err(err) if version < PdfVersion::PDF_2_0 => {
                    prop_assert_eq!(err.kind(), ErrorKind::Domain);
                    prop_assert!(err.to_string().contains("PDF 2.0 or higher"));
                }
                Err(err) if algorithm.version() < 5 => {
                    prop_assert_eq!(err.kind(), ErrorKind::Domain);
                    prop_assert!(err.to_string().contains("version 5 or higher"));
                }
                Err(err) => {
                    prop_assert!(fips);
                    prop_assert!(matches!(err, PadesError::Crypto(CryptoError::UnsupportedInFipsMode(_))));
                }
            }
        }
    }
}
