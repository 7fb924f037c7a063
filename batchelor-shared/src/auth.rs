//! The three-role auth model (§6): `read-only`, `execute`, `worker`.
//! Grounded in `batchelor-common/src/main/batchelor/common/auth/RequestHandler.cpp`,
//! which accepts either `Authorization: Bearer <api-key>` or
//! `Authorization: Basic <base64(user:pw)>`.

use base64::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    ReadOnly,
    Execute,
    Worker,
}

impl Role {
    /// Whether a principal with this role may perform an operation that
    /// requires at least `required`. Execute implies read-only; worker is a
    /// distinct lane (not a superset of execute) per §6.
    pub fn satisfies(&self, required: Role) -> bool {
        match (self, required) {
            (_, Role::ReadOnly) => true,
            (Role::Execute, Role::Execute) => true,
            (Role::Worker, Role::Worker) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub role: Role,
    pub principal: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingHeader,
    Malformed,
    Invalid,
}

#[derive(Debug, Clone)]
pub enum Credential {
    Bearer(String),
    Basic { user: String, password: String },
}

/// Parses an `Authorization` header value into a `Credential`. Returns
/// `Malformed` for a header that isn't a well-formed `Bearer`/`Basic`
/// scheme, distinct from `MissingHeader` (no header at all) and `Invalid`
/// (well-formed but not accepted against the configured credentials).
pub fn parse_authorization_header(value: &str) -> Result<Credential, AuthError> {
    let mut parts = value.splitn(2, ' ');
    let scheme = parts.next().ok_or(AuthError::Malformed)?;
    let rest = parts.next().ok_or(AuthError::Malformed)?.trim();

    match scheme {
        "Bearer" => {
            if rest.is_empty() {
                return Err(AuthError::Malformed);
            }
            Ok(Credential::Bearer(rest.to_string()))
        }
        "Basic" => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(rest)
                .map_err(|_| AuthError::Malformed)?;
            let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
            let (user, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;
            Ok(Credential::Basic {
                user: user.to_string(),
                password: password.to_string(),
            })
        }
        _ => Err(AuthError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_satisfies_read_only_always() {
        assert!(Role::Execute.satisfies(Role::ReadOnly));
        assert!(Role::Worker.satisfies(Role::ReadOnly));
        assert!(Role::ReadOnly.satisfies(Role::ReadOnly));
    }

    #[test]
    fn worker_does_not_satisfy_execute() {
        assert!(!Role::Worker.satisfies(Role::Execute));
        assert!(!Role::ReadOnly.satisfies(Role::Execute));
    }

    #[test]
    fn parses_bearer() {
        let cred = parse_authorization_header("Bearer abc123").unwrap();
        assert!(matches!(cred, Credential::Bearer(s) if s == "abc123"));
    }

    #[test]
    fn parses_basic() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:secret");
        let header = format!("Basic {encoded}");
        let cred = parse_authorization_header(&header).unwrap();
        match cred {
            Credential::Basic { user, password } => {
                assert_eq!(user, "alice");
                assert_eq!(password, "secret");
            }
            _ => panic!("expected Basic"),
        }
    }

    #[test]
    fn rejects_malformed_basic() {
        assert_eq!(
            parse_authorization_header("Basic not-base64!!!").unwrap_err(),
            AuthError::Malformed
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert_eq!(parse_authorization_header("Digest abc").unwrap_err(), AuthError::Malformed);
    }
}
