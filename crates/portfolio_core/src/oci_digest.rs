use digest::Digest;

use sha2::Sha256;

use crate::{Error, Result};

/// A content digest of the form `<algorithm>:<hex>`.
///
/// <https://github.com/opencontainers/image-spec/blob/main/descriptor.md#digests>
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OciDigest {
    algorithm: RegisteredDigestAlgorithm,
    encoded: String,
}

impl TryFrom<&str> for OciDigest {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        let i = match s.find(':') {
            Some(i) => i,
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        let algo: &str = match s.get(..i) {
            Some(a) => a,
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        let encoded: &str = match s.get(i + 1..) {
            Some(e) if !e.is_empty() => e,
            _ => return Err(Error::InvalidDigest(s.to_string())),
        };
        let algorithm = RegisteredDigestAlgorithm::try_from(algo)
            .map_err(|_| Error::InvalidDigest(s.to_string()))?;

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl TryFrom<String> for OciDigest {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(s.as_str())
    }
}

impl From<&[u8]> for OciDigest {
    /// Compute the sha256 digest of `bs`. Manifest content-addressing always uses sha256
    /// regardless of what digest a referenced sub-manifest happened to use.
    fn from(bs: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bs);
        Self {
            algorithm: RegisteredDigestAlgorithm::Sha256,
            encoded: format!("{:x}", hasher.finalize()),
        }
    }
}

impl From<OciDigest> for String {
    fn from(d: OciDigest) -> String {
        String::from(&d)
    }
}

impl From<&OciDigest> for String {
    fn from(d: &OciDigest) -> String {
        format!("{}:{}", String::from(d.algorithm), d.encoded)
    }
}

impl std::fmt::Display for OciDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", String::from(self.algorithm), self.encoded)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum RegisteredDigestAlgorithm {
    Sha256,
    Sha512,
}

impl TryFrom<&str> for RegisteredDigestAlgorithm {
    type Error = Error;

    fn try_from(a: &str) -> Result<Self> {
        match a {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            s => Err(Error::UnsupportedDigestAlgorithm(String::from(s))),
        }
    }
}

impl From<RegisteredDigestAlgorithm> for String {
    fn from(a: RegisteredDigestAlgorithm) -> String {
        match a {
            RegisteredDigestAlgorithm::Sha256 => String::from("sha256"),
            RegisteredDigestAlgorithm::Sha512 => String::from("sha512"),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::sha256("sha256:meow", Ok(OciDigest {
        algorithm: RegisteredDigestAlgorithm::Sha256,
        encoded: String::from("meow"),
    }))]
    #[case::sha512("sha512:meow", Ok(OciDigest {
        algorithm: RegisteredDigestAlgorithm::Sha512,
        encoded: String::from("meow"),
    }))]
    #[case::bad_algo("sha666:meow", Err(Error::InvalidDigest(String::from("sha666:meow"))))]
    #[case::no_colon("sha256meow", Err(Error::InvalidDigest(String::from("sha256meow"))))]
    #[case::empty_hex("sha256:", Err(Error::InvalidDigest(String::from("sha256:"))))]
    #[case::empty_algo(":meow", Err(Error::InvalidDigest(String::from(":meow"))))]
    fn validate_try_from(#[case] input: &str, #[case] expected: Result<OciDigest>) {
        let actual: Result<OciDigest> = input.try_into();
        match (expected, actual) {
            (Ok(exp), Ok(act)) => assert_eq!(exp, act),
            (Ok(s), Err(e)) => panic!("expected Ok( {s:?} ) got Err( {e:?} )"),
            (Err(exp), Err(act)) => assert_eq!(format!("{exp}"), format!("{act}")),
            (Err(e), Ok(s)) => panic!("expected Err( {e:?} ) got Ok( {s:?} )"),
        }
    }

    #[test]
    fn digest_round_trips_through_string() {
        let d = OciDigest::try_from("sha256:deadbeef").unwrap();
        let s: String = (&d).into();
        assert_eq!(s, "sha256:deadbeef");
    }

    #[test]
    fn from_bytes_computes_sha256() {
        let d = OciDigest::from(b"hello world".as_ref());
        assert_eq!(
            String::from(&d),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
