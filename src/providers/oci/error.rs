use thiserror::Error;

use crate::resource::ResourceKind;

/// OCI-specific errors that can occur during API operations.
///
/// SECURITY: Error messages must NEVER contain the authorization header value.
#[derive(Debug, Error)]
pub enum OciError {
    /// Request was rejected as unauthenticated
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// API returned an error response
    #[error("API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Resource does not exist (or the caller may not see it)
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    /// Resource is still referenced, or is a default object OCI refuses to delete
    #[error("conflict ({code}): {message}")]
    Conflict { code: String, message: String },

    /// Network-level error (connection failed, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode {kind} response: {message}")]
    Decode { kind: ResourceKind, message: String },

    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: ResourceKind,
        operation: &'static str,
    },
}

impl From<OciError> for crate::providers::ProviderError {
    fn from(err: OciError) -> Self {
        use crate::providers::ProviderError;

        match err {
            OciError::NotFound { kind, id } => ProviderError::NotFound { kind, id },
            conflict @ OciError::Conflict { .. } => ProviderError::InUse {
                message: conflict.to_string(),
            },
            OciError::Unsupported { kind, operation } => {
                ProviderError::Unsupported { kind, operation }
            }
            other => ProviderError::Oci(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;

    #[test]
    fn test_api_error_display() {
        let err = OciError::Api {
            status: 500,
            code: "InternalServerError".to_string(),
            message: "Out of host capacity".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (500 InternalServerError): Out of host capacity"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = OciError::NotFound {
            kind: ResourceKind::Subnet,
            id: "ocid1.subnet.oc1..aaa".to_string(),
        };
        assert_eq!(err.to_string(), "subnet 'ocid1.subnet.oc1..aaa' not found");
    }

    #[test]
    fn test_conflict_converts_to_in_use() {
        let err = OciError::Conflict {
            code: "Conflict".to_string(),
            message: "Cannot delete default route table".to_string(),
        };
        let provider_err: ProviderError = err.into();
        assert!(provider_err.is_in_use());
        assert!(provider_err.to_string().contains("default route table"));
    }

    #[test]
    fn test_not_found_converts_to_not_found() {
        let err = OciError::NotFound {
            kind: ResourceKind::Instance,
            id: "i1".to_string(),
        };
        let provider_err: ProviderError = err.into();
        assert!(provider_err.is_not_found());
    }

    #[test]
    fn test_auth_converts_to_generic_oci_error() {
        let err = OciError::Auth {
            message: "The required information to complete authentication was not provided"
                .to_string(),
        };
        let provider_err: ProviderError = err.into();
        assert!(matches!(provider_err, ProviderError::Oci(_)));
        assert!(provider_err.to_string().contains("authentication failed"));
    }

    #[test]
    fn test_error_does_not_contain_token() {
        let fake_token = "Signature version=\"1\",keyId=\"secret\"";
        let err = OciError::Auth {
            message: "NotAuthenticated".to_string(),
        };
        assert!(!err.to_string().contains(fake_token));
    }
}
