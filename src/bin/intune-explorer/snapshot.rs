use log::{info, warn};

use intune_explorer::artifacts::SnapshotMeta;
use intune_explorer::config_file::Settings;
use intune_explorer::graph_api::{FetchError, GraphClient};
use intune_explorer::refresh::{self, RefreshError, Scope};
use intune_explorer::store::SqliteStore;

/// Make sure the store holds a usable snapshot, refreshing it when `force`
/// is set, no refresh ever completed, or the snapshot lacks the extended
/// kinds the settings ask for.
///
/// # Errors
///
/// Returns an error if authentication, any remote call or the store write
/// fails, or if the refresh is interrupted with Ctrl+C.
pub async fn ensure(
    store: &mut SqliteStore,
    settings: &Settings,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = Scope::from(settings);

    let meta = store.meta()?;
    if !force && !refresh::refresh_required(meta.as_ref(), &scope) {
        if let Some(meta) = meta {
            info!("Using snapshot taken at unix time {}", meta.refreshed_at);
            for reason in refresh::stale_reasons(&meta, &scope) {
                warn!("Cached {reason}; run with --reload to refresh");
            }
        }
        return Ok(());
    }
    match meta {
        None if !force => info!("No completed snapshot found, refreshing"),
        Some(_) if !force => info!("Snapshot lacks beta API data, refreshing"),
        _ => {}
    }

    eprintln!("Refreshing snapshot, this may take a while...");
    let mut client = GraphClient::new(settings)?;
    let work = async {
        client.authenticate().await?;
        let meta = refresh::refresh(&client, store, &scope).await?;
        Ok::<SnapshotMeta, RefreshError>(meta)
    };

    let result = tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => Err(RefreshError::from(FetchError::Interrupted)),
    };
    client.disconnect();

    let meta = result?;
    info!("Snapshot refreshed at unix time {}", meta.refreshed_at);
    Ok(())
}
