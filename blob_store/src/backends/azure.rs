//! Azure Blob Storage client construction.

use object_store::azure::{MicrosoftAzure, MicrosoftAzureBuilder};
use tracing::debug;

use crate::{BlobError, BlobResult};

/// Builds a client for one container.
///
/// Credentials come from the `AZURE_*` environment (access key, SAS,
/// client secret, managed identity). Azure enforces
/// `If-None-Match: *` natively, no extra configuration needed for
/// write-once puts.
pub(crate) fn build(container: &str, account: Option<&str>) -> BlobResult<MicrosoftAzure> {
    if container.is_empty() {
        return Err(BlobError::invalid_config("Azure container name cannot be empty"));
    }

    let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(container);
    if let Some(account) = account {
        builder = builder.with_account(account);
    }

    let store = builder.build().map_err(|e| BlobError::Network {
        source: anyhow::Error::from(e),
    })?;

    debug!(container = %container, account = ?account, "created Azure blob store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_container_is_rejected() {
        let result = build("", Some("account"));
        assert!(matches!(result, Err(BlobError::InvalidConfig { .. })));
    }
}
