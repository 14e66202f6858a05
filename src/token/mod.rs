pub mod claims;
pub mod error;
pub mod key;
pub mod paseto;
pub mod verifier;

pub use claims::Claims;
pub use error::VerificationError;
pub use key::{KeyError, PublicKey};
pub use paseto::{ClaimRules, SignatureValidated, Token, TokenState, Unvalidated, Validated};
pub use verifier::{TokenVerifier, VerificationOutcome, VerifierConfig, strip_bearer};
