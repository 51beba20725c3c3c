//! # cryptdrop Unlock
//!
//! Obtaining the account private key and holding it while unlocked.
//!
//! ## Unlock Methods
//!
//! | Method | Credential | Sealed copy |
//! |--------|-----------|-------------|
//! | Passphrase | passphrase | Argon2id-derived key |
//! | Biometric | platform authenticator | PRF-derived key |
//! | Hardware key | roaming authenticator | PRF-derived key |
//! | Key file | file (+ passphrase if encrypted) | none, carried by the user |
//!
//! Every method is an [`UnlockStrategy`] variant. All four converge on the
//! same [`UnlockOutcome`], and the [`KeyUnlockManager`] holds the key in an
//! [`UnlockSession`] that is zeroized on lock, logout or expiry.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cryptdrop_core::{CancelToken, KeyPair};
//! use cryptdrop_unlock::{
//!     KdfParams, KeyUnlockManager, PassphraseSealedKey, SealedKeyMaterial, UnlockConfig,
//!     UnlockStrategy,
//! };
//!
//! async fn example() {
//!     let pair = KeyPair::generate();
//!     let sealed = PassphraseSealedKey::seal(&pair.private, "pw", KdfParams::default()).unwrap();
//!     let manager = KeyUnlockManager::new(
//!         pair.public.clone(),
//!         SealedKeyMaterial::with_passphrase(sealed),
//!         UnlockConfig::default(),
//!     );
//!
//!     let outcome = manager
//!         .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
//!         .await
//!         .unwrap();
//!     println!("unlocked until {}", outcome.expires_at_millis);
//! }
//! ```

pub mod authenticator;
pub mod clock;
pub mod config;
pub mod error;
pub mod kdf;
pub mod keyfile;
pub mod manager;
pub mod sealed;
pub mod session;
pub mod state;
pub mod strategy;

pub use authenticator::{
    Authenticator, AuthenticatorClass, CredentialId, PromptBehavior, SoftwareAuthenticator,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::UnlockConfig;
pub use error::{Result, UnlockError, INCORRECT_CREDENTIAL};
pub use kdf::KdfParams;
pub use keyfile::{KeyFile, KEY_TYPE};
pub use manager::{KeyUnlockManager, UnlockOutcome};
pub use sealed::{AuthenticatorSealedKey, PassphraseSealedKey, SealedKeyMaterial};
pub use session::UnlockSession;
pub use state::{LockReason, UnlockMethod, UnlockState};
pub use strategy::{offerable_methods, UnlockStrategy};
