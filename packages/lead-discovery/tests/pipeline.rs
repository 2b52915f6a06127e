//! End-to-end discovery runs against mock sources and the memory store.

use std::sync::Arc;
use std::time::Duration;

use lead_discovery::{
    AggregatorSettings, Configuration, ContentFetcher, DiscoveryPipeline, InFlightGauge,
    JobSnapshot, JobStage, LeadSource, ManualClock, MemoryStore, MockSource, MockTransport,
    PipelineError, PipelineSettings, SourceKind, StaticFetcher,
};
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    pipeline: DiscoveryPipeline,
}

async fn harness(sources: Vec<Arc<dyn LeadSource>>) -> Harness {
    harness_with(
        sources,
        AggregatorSettings::default(),
        Arc::new(StaticFetcher::new()),
    )
    .await
}

async fn harness_with(
    sources: Vec<Arc<dyn LeadSource>>,
    aggregator: AggregatorSettings,
    fetcher: Arc<dyn ContentFetcher>,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let pipeline = DiscoveryPipeline::builder(store.clone(), store.clone())
        .settings(
            PipelineSettings::default()
                .with_requests_per_second(None)
                .with_aggregator(aggregator),
        )
        .clock(Arc::new(ManualClock::default()))
        .transport(Arc::new(MockTransport::new()))
        .sources(sources)
        .fetcher(fetcher)
        .build()
        .await
        .unwrap();
    Harness { store, pipeline }
}

async fn wait_for_terminal(pipeline: &DiscoveryPipeline, job_id: &str) -> JobSnapshot {
    for _ in 0..200 {
        if let Some(job) = pipeline.job(job_id) {
            if job.stage.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

async fn wait_for_recorded_run(store: &MemoryStore, config_id: Uuid) -> Configuration {
    for _ in 0..200 {
        let config = store.configuration_snapshot(config_id).unwrap();
        if config.last_run_at.is_some() {
            return config;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run for {} was never recorded", config_id);
}

fn hotel_sources() -> Vec<Arc<dyn LeadSource>> {
    vec![
        Arc::new(MockSource::new(SourceKind::Tavily).with_hit(
            "Marriott plans 200-room hotel in Austin, TX",
            "https://news.example.com/marriott-austin",
            "Marriott International announced a $45 million hotel with 200 rooms. \
             Construction starts next spring.",
        )),
        Arc::new(MockSource::new(SourceKind::WebSearch).with_hit(
            "Hilton breaks ground on resort",
            "https://web.example.com/hilton-resort",
            "Hilton Worldwide is developing a resort in Naples, FL.",
        )),
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_now_walks_every_stage() {
    let h = harness(hotel_sources()).await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel", "construction"])
        .with_sources([SourceKind::Tavily, SourceKind::WebSearch]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    assert!(ticket.job_id.starts_with(&format!("config-{}-", config.id)));
    assert_eq!(ticket.config_summary.keywords, vec!["hotel", "construction"]);

    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;
    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(
        job.stage_history,
        vec![
            JobStage::Initializing,
            JobStage::Scraping,
            JobStage::Enriching,
            JobStage::Extracting,
            JobStage::Saving,
            JobStage::Completed,
        ]
    );
    assert_eq!(job.percentage, 100);

    let summary = job.summary.unwrap();
    let saved = h.store.leads_for(owner);
    assert_eq!(summary.saved_leads, saved.len());
    assert_eq!(saved.len(), 2);
    assert_eq!(summary.sources_succeeded, 2);

    let marriott = saved
        .iter()
        .find(|l| l.url == "https://news.example.com/marriott-austin")
        .unwrap();
    assert!(marriott.verified_source);
    assert!(marriott.confidence > 0);
    assert!(marriott.confidence <= 100);

    let recorded = wait_for_recorded_run(&h.store, config.id).await;
    assert!(recorded.next_run_at.is_some());

    let progress = h.pipeline.progress(&ticket.job_id).unwrap();
    assert_eq!(progress.stage, JobStage::Completed);
    assert_eq!(h.pipeline.jobs_for_user(owner).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sink_failure_ends_in_error() {
    let h = harness(hotel_sources()).await;
    h.store.set_reject_saves(true);
    let config = Configuration::new(Uuid::new_v4(), "Hotels", ["hotel"])
        .with_sources([SourceKind::Tavily]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;

    assert_eq!(job.stage, JobStage::Error);
    assert!(job.error.unwrap().contains("Saving leads failed"));
    assert!(job.percentage >= 90);

    // Timestamps are recorded even for failed runs
    wait_for_recorded_run(&h.store, config.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_urls_keep_api_result() {
    let shared = "https://news.example.com/shared";
    let h = harness(vec![
        Arc::new(MockSource::new(SourceKind::HotelNews).with_hit("Industry copy", shared, "hotel"))
            as Arc<dyn LeadSource>,
        Arc::new(MockSource::new(SourceKind::WebSearch).with_hit("Web copy", shared, "hotel")),
        Arc::new(MockSource::new(SourceKind::Tavily).with_hit("API copy", shared, "hotel")),
    ])
    .await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel"]).with_sources([
        SourceKind::HotelNews,
        SourceKind::WebSearch,
        SourceKind::Tavily,
    ]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;

    let summary = job.summary.unwrap();
    assert_eq!(summary.candidates_found, 3);
    assert_eq!(summary.duplicates_removed, 2);

    let saved = h.store.leads_for(owner);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].source, SourceKind::Tavily);
    assert_eq!(saved[0].title, "API copy");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_source_is_isolated() {
    let failing = Arc::new(MockSource::new(SourceKind::Tavily).failing("quota exceeded"));
    let h = harness(vec![
        failing.clone() as Arc<dyn LeadSource>,
        Arc::new(MockSource::new(SourceKind::NewsApi).with_hit(
            "New hotel tower approved",
            "https://news.example.com/tower",
            "A hotel tower won approval.",
        )),
    ])
    .await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel"])
        .with_sources([SourceKind::Tavily, SourceKind::NewsApi]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;

    assert_eq!(job.stage, JobStage::Completed);
    let summary = job.summary.unwrap();
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.sources_succeeded, 1);
    assert_eq!(failing.calls(), 1);
    assert_eq!(h.store.leads_for(owner).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_max_results_caps_candidates() {
    let mut source = MockSource::new(SourceKind::Tavily);
    for i in 0..5 {
        source = source.with_hit(
            &format!("Hotel {}", i),
            &format!("https://news.example.com/{}", i),
            "hotel",
        );
    }
    let h = harness(vec![Arc::new(source)]).await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel"])
        .with_sources([SourceKind::Tavily])
        .with_max_results(3);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    wait_for_terminal(&h.pipeline, &ticket.job_id).await;
    assert_eq!(h.store.leads_for(owner).len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_now_rejections_create_no_job() {
    let h = harness(hotel_sources()).await;

    let missing = Uuid::new_v4();
    assert!(matches!(
        h.pipeline.run_now(missing).await,
        Err(PipelineError::ConfigurationNotFound(id)) if id == missing
    ));

    let owner = Uuid::new_v4();
    let no_keywords = Configuration::new(owner, "Empty", ["  "]);
    h.store.insert_configuration(no_keywords.clone());
    assert!(matches!(
        h.pipeline.run_now(no_keywords.id).await,
        Err(PipelineError::Validation(_))
    ));

    let inactive_owner = Uuid::new_v4();
    let config = Configuration::new(inactive_owner, "Hotels", ["hotel"]);
    h.store.insert_configuration(config.clone());
    h.store.set_user_active(inactive_owner, false);
    assert!(matches!(
        h.pipeline.run_now(config.id).await,
        Err(PipelineError::UserInactive(_))
    ));

    assert!(h.pipeline.jobs_for_user(owner).is_empty());
    assert!(h.pipeline.jobs_for_user(inactive_owner).is_empty());
    assert!(h.pipeline.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_job_has_no_progress() {
    let h = harness(hotel_sources()).await;
    assert!(h.pipeline.progress("config-nope-0").is_none());
    assert!(h.pipeline.job("config-nope-0").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_never_moves_backward() {
    let delay = Duration::from_millis(40);
    let h = harness_with(
        vec![
            Arc::new(
                MockSource::new(SourceKind::Tavily)
                    .with_hit("Hotel one", "https://news.example.com/1", "hotel")
                    .with_delay(delay),
            ) as Arc<dyn LeadSource>,
            Arc::new(
                MockSource::new(SourceKind::NewsApi)
                    .with_hit("Hotel two", "https://news.example.com/2", "hotel")
                    .with_delay(delay),
            ),
            Arc::new(
                MockSource::new(SourceKind::WebSearch)
                    .with_hit("Hotel three", "https://web.example.com/3", "hotel")
                    .with_delay(delay),
            ),
        ],
        AggregatorSettings {
            fan_out: 1,
            ..AggregatorSettings::default()
        },
        Arc::new(StaticFetcher::new()),
    )
    .await;
    let config = Configuration::new(Uuid::new_v4(), "Hotels", ["hotel"]).with_sources([
        SourceKind::Tavily,
        SourceKind::NewsApi,
        SourceKind::WebSearch,
    ]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let mut seen = Vec::new();
    for _ in 0..2000 {
        let progress = h.pipeline.progress(&ticket.job_id).unwrap();
        let done = progress.stage.is_terminal();
        seen.push((progress.stage, progress.percentage));
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(seen.last(), Some(&(JobStage::Completed, 100)));
    assert!(seen.len() > 2, "only sampled {:?}", seen);
    for pair in seen.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "stage went backward: {:?}", seen);
        assert!(pair[0].1 <= pair[1].1, "percentage went backward: {:?}", seen);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_source_times_out_without_failing_run() {
    let slow = Arc::new(
        MockSource::new(SourceKind::Tavily)
            .with_hit("Slow hotel", "https://news.example.com/slow", "hotel")
            .with_delay(Duration::from_secs(30)),
    );
    let h = harness_with(
        vec![
            slow.clone() as Arc<dyn LeadSource>,
            Arc::new(MockSource::new(SourceKind::NewsApi).with_hit(
                "Fast hotel",
                "https://news.example.com/fast",
                "hotel",
            )),
        ],
        AggregatorSettings {
            source_timeout: Duration::from_millis(100),
            ..AggregatorSettings::default()
        },
        Arc::new(StaticFetcher::new()),
    )
    .await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel"])
        .with_sources([SourceKind::Tavily, SourceKind::NewsApi]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;

    assert_eq!(job.stage, JobStage::Completed);
    let summary = job.summary.unwrap();
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.sources_succeeded, 1);
    assert_eq!(slow.calls(), 1);

    let saved = h.store.leads_for(owner);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].url, "https://news.example.com/fast");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_short_snippets_are_enriched_before_extraction() {
    let url = "https://news.example.com/denver-update";
    let fetcher = Arc::new(StaticFetcher::new().with_page(
        url,
        "Hyatt Hotels Corporation is building a 150-room hotel in Denver, CO. \
         The project carries a $40 million budget.",
    ));
    let h = harness_with(
        vec![Arc::new(MockSource::new(SourceKind::Tavily).with_hit(
            "Downtown project update",
            url,
            "Details inside.",
        )) as Arc<dyn LeadSource>],
        AggregatorSettings::default(),
        fetcher.clone(),
    )
    .await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel"]).with_sources([SourceKind::Tavily]);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;

    assert_eq!(job.stage, JobStage::Completed);
    assert!(job.stage_history.contains(&JobStage::Enriching));
    assert_eq!(job.summary.unwrap().candidates_enriched, 1);
    assert_eq!(fetcher.calls(), 1);

    // Room count and budget only appear in the fetched page
    let saved = h.store.leads_for(owner);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].fields.room_count.as_known(), Some(&150));
    assert!(saved[0].fields.budget.is_known());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fan_out_bounds_concurrent_searches() {
    let gauge = Arc::new(InFlightGauge::new());
    let kinds = [
        SourceKind::Tavily,
        SourceKind::NewsApi,
        SourceKind::WebSearch,
        SourceKind::HotelNews,
        SourceKind::ConstructionNews,
    ];
    let sources: Vec<Arc<dyn LeadSource>> = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            Arc::new(
                MockSource::new(*kind)
                    .with_hit(
                        &format!("Hotel {}", i),
                        &format!("https://news.example.com/{}", i),
                        "hotel",
                    )
                    .with_delay(Duration::from_millis(30))
                    .with_gauge(gauge.clone()),
            ) as Arc<dyn LeadSource>
        })
        .collect();
    let h = harness_with(
        sources,
        AggregatorSettings {
            fan_out: 2,
            ..AggregatorSettings::default()
        },
        Arc::new(StaticFetcher::new()),
    )
    .await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel"]).with_sources(kinds);
    h.store.insert_configuration(config.clone());

    let ticket = h.pipeline.run_now(config.id).await.unwrap();
    let job = wait_for_terminal(&h.pipeline, &ticket.job_id).await;

    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(job.summary.unwrap().sources_succeeded, 5);
    assert_eq!(gauge.peak(), 2);
    assert_eq!(h.store.leads_for(owner).len(), 5);
}
