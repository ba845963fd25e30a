use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::models::{FindCriterion, TimeWindow};
use crate::domain::repository::RepositoryClient;
use crate::domain::sink::FrontierSink;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Query the repository once per find criterion and forward every identifier
/// to the frontier. The first failure aborts the whole discovery batch.
///
/// Returns the number of seeds emitted, duplicates included.
pub async fn discover_seeds(
    client: &dyn RepositoryClient,
    window: TimeWindow,
    criteria: &[FindCriterion],
    frontier: &dyn FrontierSink,
) -> ConnectorResult<usize> {
    let mut emitted = 0;

    for criterion in criteria {
        debug!(
            "Finding documents where {} = '{}' in {}",
            criterion.name, criterion.value, window
        );
        let filter = HashMap::from([(criterion.name.clone(), criterion.value.clone())]);

        let mut ids = client
            .find_documents(window, filter)
            .await
            .map_err(|e| log_batch_error(ConnectorError::from_batch_error(e)))?;

        while let Some(id) = ids.next().await {
            let id = id.map_err(|e| log_batch_error(ConnectorError::from_batch_error(e)))?;
            frontier.add_seed(&id).await?;
            emitted += 1;
        }
    }

    Ok(emitted)
}

fn log_batch_error(err: ConnectorError) -> ConnectorError {
    if !err.is_cancelled() {
        warn!("Error finding documents: {}", err);
    }
    err
}
