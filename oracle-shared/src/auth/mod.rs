/// Authentication primitives
///
/// - [`password`]: Argon2id hashing and verification
/// - [`session`]: server-side sessions and signed session cookies
///
/// # Example
///
/// ```
/// use oracle_shared::auth::password::{hash_password, verify_password};
/// use oracle_shared::auth::session::SessionSigner;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("hunter2")?;
/// assert!(verify_password("hunter2", &hash)?);
///
/// let signer = SessionSigner::new("a-secret-that-is-at-least-32-bytes-long");
/// let cookie = signer.sign("abc123");
/// assert_eq!(signer.verify(&cookie).as_deref(), Some("abc123"));
/// # Ok(())
/// # }
/// ```

pub mod password;
pub mod session;
