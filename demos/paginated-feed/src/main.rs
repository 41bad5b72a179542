//! Paginated feed demo
//!
//! Loads feed pages through a `cache-and-network` session whose merge appends
//! each page to the list. Revisiting a page is served from the cache at once
//! and then revalidated; the fresh page is merged onto the list as it was
//! before the cache hit, so cached items are never appended twice.
//!
//! Pass a JSON settings file as the first argument to override the defaults,
//! for example `{ "cache_policy": "no-cache" }`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use swr_request_core::{
    CancellationToken, MemoryCacheStore, RequestDescriptor, RequestError, RequestOptions,
    Response,
};
use swr_request_runtime::RequestSession;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PAGE_SIZE: u64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FeedItem {
    id: u64,
    title: String,
}

type Feed = Vec<FeedItem>;

/// Stand-in for a remote feed service
#[derive(Clone)]
struct FeedServer {
    revision: Arc<AtomicU64>,
    latency: Duration,
}

impl FeedServer {
    fn new(latency: Duration) -> Self {
        Self {
            revision: Arc::new(AtomicU64::new(1)),
            latency,
        }
    }

    /// Edit every post, so the next fetch of any page differs from the cache
    fn publish(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch(
        &self,
        request: RequestDescriptor,
        signal: CancellationToken,
    ) -> Result<Response<Feed>, RequestError> {
        let page = request
            .as_value()
            .get("page")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| RequestError::transport("request has no page number"))?;

        tokio::select! {
            () = signal.cancelled() => return Err(RequestError::Cancelled),
            () = tokio::time::sleep(self.latency) => {},
        }

        let revision = self.revision.load(Ordering::SeqCst);
        let first = page.saturating_sub(1) * PAGE_SIZE + 1;
        let items: Feed = (first..first + PAGE_SIZE)
            .map(|id| FeedItem {
                id,
                title: format!("Post {id} (rev {revision})"),
            })
            .collect();

        Response::from_data(items).map_err(|e| RequestError::transport(e.to_string()))
    }
}

fn load_settings() -> anyhow::Result<serde_json::Value> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            tracing::info!(path = %path, "Loaded settings file");
            Ok(serde_json::from_str(&raw)?)
        },
        None => Ok(serde_json::json!({
            "cache_policy": "cache-and-network",
            "initial_data": [],
        })),
    }
}

fn print_feed(label: &str, feed: &Feed) {
    println!("{label}: {} items", feed.len());
    for item in feed {
        println!("    #{:<3} {}", item.id, item.title);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paginated_feed=info,swr_request_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    swr_request_runtime::metrics::register_metrics();

    println!("=== Paginated Feed: stale-while-revalidate ===\n");

    let server = FeedServer::new(Duration::from_millis(150));
    let transport = server.clone();
    let cache = Arc::new(MemoryCacheStore::new());

    let options = RequestOptions::new(Feed::new())
        .with_build_request(|page: u64| serde_json::json!({ "feed": "home", "page": page }))
        .with_merge_data(|current: &Feed, incoming: Feed| {
            current.iter().cloned().chain(incoming).collect()
        })
        .with_on_cancelled(|| tracing::info!("Feed request cancelled"))
        .with_executor(move |request: RequestDescriptor, signal: CancellationToken| {
            let transport = transport.clone();
            async move { transport.fetch(request, signal).await }
        })
        .apply_settings(&load_settings()?)?;

    let session = RequestSession::with_cache(options, Arc::clone(&cache))?;
    println!("Cache policy: {}\n", session.cache_policy());

    // Cold cache: both pages go to the network
    println!(">>> Loading pages 1 and 2");
    session.do_request(1).await?;
    session.do_request(2).await?;
    print_feed("Feed", &session.data().await);
    println!("Cached pages: {}\n", cache.len());

    // Warm cache, nothing changed upstream
    println!(">>> Pull to refresh (reset, reload page 1)");
    session.reset().await;
    session.do_request(1).await?;
    print_feed("Feed", &session.data().await);
    println!();

    // Warm cache, upstream changed
    println!(">>> Posts edited upstream, reload page 1");
    server.publish();
    session.reset().await;
    let mut states = session.subscribe();
    let refresh = session.spawn_request(1);

    states.changed().await?;
    print_feed("Served from cache", &states.borrow_and_update().data);

    refresh.join().await?;
    print_feed("After revalidation", &session.data().await);
    println!();

    // Cancellation
    println!(">>> Loading page 3, then cancelling");
    let slow = session.spawn_request(3);
    tokio::time::sleep(Duration::from_millis(20)).await;
    if session.is_pending() {
        session.abort()?;
    }
    match slow.join().await {
        Err(RequestError::Cancelled) => println!("Page 3 request cancelled"),
        Err(e) => return Err(e.into()),
        Ok(_) => println!("Page 3 finished before it could be cancelled"),
    }

    let state = session.state().await;
    println!(
        "Final state: loading={}, error={:?}, items={}",
        state.loading,
        state.error,
        state.data.len()
    );

    Ok(())
}
