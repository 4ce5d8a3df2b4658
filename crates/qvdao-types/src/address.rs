use crate::error::TypesError;
use std::fmt;
use std::str::FromStr;

/// 20-byte member identity.
/// Display format: Bech32m with "qv" human-readable prefix.
///
/// The ledger treats addresses as opaque principals; the session layer is
/// responsible for proving that a caller controls one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);
    pub const LEN: usize = 20;

    /// Bech32m human-readable prefix
    pub const BECH32_HRP: &'static str = "qv";

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Identity from raw bytes; anything but exactly 20 bytes is rejected.
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        let bytes: [u8; 20] = slice.try_into().map_err(|_| TypesError::WrongLength {
            expected: Self::LEN,
            found: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Identity of an ed25519 key holder: the leading 20 bytes of the
    /// key's blake3 digest.
    pub fn from_public_key(pubkey: &[u8; 32]) -> Self {
        Self::from_digest(blake3::hash(pubkey))
    }

    /// Derive a deterministic address from a human label.
    ///
    /// Used by configuration files and scripts that name members
    /// (`"label:alice"`) instead of spelling out raw identities.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"qvdao/label/");
        hasher.update(label.as_bytes());
        Self::from_digest(hasher.finalize())
    }

    fn from_digest(hash: blake3::Hash) -> Self {
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash.as_bytes()[..20]);
        Self(addr)
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Bare lowercase hex, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short form for log lines: first four bytes in hex.
    pub fn short(&self) -> String {
        format!("0x{}…", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = bech32::Hrp::parse_unchecked(Self::BECH32_HRP);
        let encoded = bech32::encode::<bech32::Bech32m>(prefix, &self.0).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = TypesError;

    /// Accepts Bech32m (`qv1…`), hex (`0x…`) or a label (`label:alice`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(label) = s.strip_prefix("label:") {
            return match label {
                "" => Err(TypesError::UnrecognizedAddress(s.to_string())),
                name => Ok(Self::from_label(name)),
            };
        }

        if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return Self::from_slice(&hex::decode(digits)?);
        }

        if !s.starts_with("qv1") {
            return Err(TypesError::UnrecognizedAddress(s.to_string()));
        }

        let (prefix, payload) =
            bech32::decode(s).map_err(|e| TypesError::MalformedBech32(e.to_string()))?;
        if prefix != bech32::Hrp::parse_unchecked(Self::BECH32_HRP) {
            return Err(TypesError::ForeignPrefix(prefix.to_string()));
        }
        Self::from_slice(&payload)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
