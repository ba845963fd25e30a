use crate::domain::connector::version::{canonical_metadata_names, VersionToken};
use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::repository::RepositoryClient;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Resolved versions, keyed by identifier. `None` means the document does not exist.
pub type VersionMap = HashMap<String, Option<VersionToken>>;

/// Compute the version token of every identifier under the given metadata
/// selection. Any failure fails the whole batch; no partial map is returned.
pub async fn resolve_versions<'a, I>(
    client: &dyn RepositoryClient,
    ids: &[String],
    selection: I,
) -> ConnectorResult<VersionMap>
where
    I: IntoIterator<Item = &'a String>,
{
    let names = canonical_metadata_names(selection.into_iter().cloned());
    let mut versions = HashMap::with_capacity(ids.len());

    for id in ids {
        debug!("Getting update time for '{}'", id);
        let updated_at = client.document_updated_time(id).await.map_err(|e| {
            let err = ConnectorError::from_batch_error(e);
            if !err.is_cancelled() {
                warn!("Error versioning documents: {}", err);
            }
            err
        })?;

        let token = updated_at.map(|time| VersionToken::new(names.iter().cloned(), time));
        versions.insert(id.clone(), token);
    }

    Ok(versions)
}
