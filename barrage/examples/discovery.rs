use std::{sync::Arc, time::Duration};

use barrage::{
    LoadDsl, Reporter, Simulation,
    aggregate::BasicAggregate,
    config::RunnerConfig,
    macros::Injectable,
    provider::{Provider, UuidProvider},
    report::{BasicReport, JsonReporter},
    runner::Runner,
    spec::{ForEachBuilder, MapperBuilder, http},
    transport::{ReqwestTransport, Response},
};
use tracing_subscriber::EnvFilter;

/// Asks the service where its catalog lives, then fetches every item of it.
#[derive(Default, Injectable)]
struct Catalog {
    #[feeder]
    correlation: Arc<UuidProvider>,
}

impl Simulation for Catalog {
    fn scenarios(&self) -> Vec<LoadDsl> {
        let correlation = Arc::clone(&self.correlation);
        vec![
            LoadDsl::new("catalog")
                .custom("correlation-id", move |_| correlation.take())
                .run(
                    http("discover")
                        .get("http://localhost:3000/api/discovery")
                        .header("x-correlation-id", "{correlation-id}"),
                )
                .map(MapperBuilder::from("discover").try_to("endpoint", |r: &Response| {
                    r.json::<serde_json::Value>().ok()?["endpoint"]
                        .as_str()
                        .map(str::to_string)
                }))
                .run(http("items").get("{endpoint}"))
                .map(MapperBuilder::from("items").try_to("ids", |r: &Response| {
                    r.json::<Vec<String>>().ok()
                }))
                .wait(Duration::from_millis(50))
                .for_each(ForEachBuilder::over::<String, _>("ids", |id| {
                    http("item")
                        .get(format!("http://localhost:3000/api/items/{id}"))
                        .retry_if(|r| r.status().is_server_error(), 2)
                        .into()
                }))
                .run(
                    http("health")
                        .get("http://localhost:3000/health")
                        .cumulative_measurement(),
                ),
        ]
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RunnerConfig::builder()
        .users(20)
        .iterations(None)
        .duration(Duration::from_secs(15))
        .ramp_up(Duration::from_secs(5))
        .build();
    let transport = ReqwestTransport::new(config.request_timeout).unwrap();

    let results = Runner::<BasicAggregate>::builder()
        .config(config)
        .transport(Arc::new(transport))
        .build()
        .run::<Catalog>()
        .await
        .unwrap();

    let report = BasicReport::from(results);
    JsonReporter { pretty: true }.report(report).await.unwrap();
}
