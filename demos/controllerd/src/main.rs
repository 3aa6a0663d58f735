use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use mirctl_api::{DispatcherAdapter, HttpApi};
use mirctl_core::{ControllerConfig, Dispatcher, InvokerEnv, InvokerRouter, store};
use mirctl_observe::logger_init;

fn main() -> anyhow::Result<()> {
    // Config path is the only argument; defaults apply without it.
    let config = match std::env::args().nth(1) {
        Some(path) => ControllerConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => ControllerConfig::default(),
    };
    logger_init(&config.logger)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.rpc_threads.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: ControllerConfig) -> anyhow::Result<()> {
    let store = store::connect(&config.store).await?;
    let listen = config.http.listen.clone();

    let env = InvokerEnv::builder(config).with_store(store).build()?;
    let env = Arc::new(env);
    info!(
        sandbox = %env.layout.root().display(),
        workers = env.pool.size(),
        "controller environment ready"
    );

    let router = InvokerRouter::standard();
    info!(invokers = router.len(), "invokers registered");

    let mut completions = env.pool.subscribe();
    tokio::spawn(async move {
        while let Ok(done) = completions.recv().await {
            if done.response.is_ok() {
                info!(task = %done.task_id, "async task finished");
            } else {
                warn!(task = %done.task_id, code = %done.response.code, "async task failed");
            }
        }
    });

    let dispatcher = Arc::new(Dispatcher::new(router, env));
    let app = HttpApi::new(Arc::new(DispatcherAdapter::new(dispatcher))).router();

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(%listen, "controller listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down...");
        })
        .await?;
    Ok(())
}
