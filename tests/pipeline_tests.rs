mod common;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use feedmovie_api::{
    models::{JobStage, JobStatus, LlmVendor, RankedRecommendation, SourceId},
    services::aggregator::CF_WEIGHT,
    services::{GenerationRequest, OpinionSource},
};

use common::*;

const OWNER: i64 = 42;
const CLAUDE: SourceId = SourceId::Advisor(LlmVendor::Anthropic);
const CHATGPT: SourceId = SourceId::Advisor(LlmVendor::OpenAi);
const GEMINI: SourceId = SourceId::Advisor(LlmVendor::Google);
const FILL: SourceId = SourceId::GenreFill(LlmVendor::Anthropic);

fn catalog_for(titles: &[&str]) -> FakeCatalog {
    titles
        .iter()
        .enumerate()
        .fold(FakeCatalog::default(), |catalog, (i, title)| {
            catalog.with(100 + i as u64, title, &["Drama"])
        })
}

fn saved_titles(harness: &Harness) -> Vec<String> {
    harness
        .store
        .saved_for(OWNER)
        .into_iter()
        .map(|r| r.metadata.title)
        .collect()
}

#[tokio::test]
async fn test_no_ratings_and_no_sources_fails_job() {
    let harness = harness(
        MemoryStore::default(),
        FakeCatalog::default(),
        Vec::new(),
        None,
        None,
        quiet_settings(),
    );

    let job = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("No ratings found"));
    assert_eq!(harness.store.jobs_for(OWNER)[0].status, JobStatus::Failed);
    assert!(harness.store.saved_for(OWNER).is_empty());
}

#[tokio::test]
async fn test_consensus_items_rank_first() {
    let claude = ["Heat", "Ronin", "Collateral", "Thief", "Drive"];
    let chatgpt = ["Heat", "Ronin", "Collateral", "Sicario", "Prisoners"];
    let cf = ["Arrival", "Gravity", "Moon"];

    let all: Vec<&str> = claude
        .iter()
        .chain(chatgpt.iter())
        .chain(cf.iter())
        .copied()
        .collect();
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&all),
        vec![
            Arc::new(ScriptedSource::new(CLAUDE, &claude)),
            Arc::new(ScriptedSource::new(CHATGPT, &chatgpt)),
        ],
        Some(Arc::new(ScriptedSource::new(SourceId::Collaborative, &cf))),
        None,
        quiet_settings(),
    );

    let job = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let saved = harness.store.saved_for(OWNER);
    assert_eq!(saved.len(), 10);

    let top: HashSet<&str> = saved[..3].iter().map(|r| r.metadata.title.as_str()).collect();
    assert_eq!(top, HashSet::from(["Heat", "Ronin", "Collateral"]));
    for consensus in &saved[..3] {
        assert_eq!(consensus.sources, vec![CLAUDE, CHATGPT]);
        assert!((consensus.score - 0.9).abs() < 1e-9);
        assert_eq!(consensus.rationales.len(), 2);
    }

    let cf_scores: Vec<f64> = saved
        .iter()
        .filter(|r| r.sources == vec![SourceId::Collaborative])
        .map(|r| r.score)
        .collect();
    assert_eq!(cf_scores.len(), 3);
    assert!(cf_scores.iter().all(|s| (s - 0.2).abs() < 1e-9));
    assert_eq!(saved.last().map(|r| r.sources.clone()), Some(vec![SourceId::Collaborative]));
}

#[tokio::test]
async fn test_job_walks_every_stage_to_completion() {
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["Heat"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Heat"]))],
        None,
        None,
        quiet_settings(),
    );

    let job = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.duration_secs.is_some());
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_failing_source_is_isolated() {
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["Heat", "Ronin"]),
        vec![
            Arc::new(ScriptedSource::failing(GEMINI)),
            Arc::new(ScriptedSource::new(CLAUDE, &["Heat", "Ronin"])),
        ],
        None,
        None,
        quiet_settings(),
    );

    let job = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let saved = harness.store.saved_for(OWNER);
    assert_eq!(saved.len(), 2);
    // The lone responding advisor carries the whole LLM budget
    assert!((saved[0].score - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_all_sources_empty_fails_job() {
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        FakeCatalog::default(),
        vec![Arc::new(ScriptedSource::failing(CLAUDE))],
        None,
        None,
        quiet_settings(),
    );

    let job = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("No source produced any recommendations"));
}

#[tokio::test]
async fn test_unresolvable_candidates_are_dropped() {
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["Heat"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Not A Real Movie", "Heat"]))],
        None,
        None,
        quiet_settings(),
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(saved_titles(&harness), vec!["Heat"]);
}

#[tokio::test]
async fn test_spelling_variants_never_duplicate() {
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["Heat", "Alien"]),
        vec![
            Arc::new(ScriptedSource::new(CLAUDE, &["Heat", "Alien"])),
            Arc::new(ScriptedSource::new(CHATGPT, &["HEAT", "alien"])),
        ],
        None,
        None,
        quiet_settings(),
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    let titles = saved_titles(&harness);
    let distinct: HashSet<String> = titles.iter().map(|t| t.to_lowercase()).collect();
    assert_eq!(titles.len(), distinct.len());
    assert_eq!(titles.len(), 2);
}

#[tokio::test]
async fn test_target_count_truncates_after_enrichment() {
    let titles = ["Missing", "A", "B", "C", "D"];
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["A", "B", "C", "D"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &titles))],
        None,
        None,
        quiet_settings(),
    );

    let request = GenerationRequest {
        target_count: Some(3),
        ..GenerationRequest::for_owner(OWNER)
    };
    harness
        .pipeline
        .generate(request, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(saved_titles(&harness), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_shortfall_pass_pulls_unused_candidates() {
    let titles = ["A", "B", "C", "D", "E", "F"];
    let mut settings = quiet_settings();
    settings.target_count = 2;
    settings.min_total = 4;

    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&titles),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &titles))],
        None,
        None,
        settings,
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(saved_titles(&harness), vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn test_diversity_backfills_short_category() {
    let mut settings = quiet_settings();
    settings.min_per_category = 1;

    let catalog = FakeCatalog::default()
        .with(1, "Heat", &["Action", "Drama"])
        .with(2, "Airplane!", &["Comedy"])
        .with(3, "Alien", &["Horror", "Science Fiction"])
        .with(4, "Notting Hill", &["Romance", "Comedy"])
        .with(5, "Arrival", &["Science Fiction", "Drama"]);
    let fill = CategoryFillSource {
        id: FILL,
        by_category: HashMap::from([
            ("Comedy".to_string(), vec!["Airplane!".to_string()]),
            ("Horror".to_string(), vec!["Alien".to_string()]),
            ("Romance".to_string(), vec!["Heat".to_string(), "Notting Hill".to_string()]),
            ("Science Fiction".to_string(), vec!["Alien".to_string()]),
        ]),
    };

    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog,
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Heat"]))],
        None,
        Some(Arc::new(fill)),
        settings,
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    let saved = harness.store.saved_for(OWNER);
    let titles: Vec<&str> = saved.iter().map(|r| r.metadata.title.as_str()).collect();
    assert_eq!(titles, vec!["Heat", "Airplane!", "Alien", "Notting Hill"]);
    assert!(!saved[0].fill);
    assert!(saved[1..].iter().all(|r| r.fill && (r.score - 0.4).abs() < 1e-9));
    assert!(saved[1..].iter().all(|r| r.sources == vec![FILL]));
}

#[tokio::test]
async fn test_backfill_ranks_below_organic_of_same_genre() {
    let mut settings = quiet_settings();
    settings.target_count = 1;
    settings.min_total = 3;
    settings.min_per_category = 1;

    let catalog = FakeCatalog::default()
        .with(101, "Heat", &["Action"])
        .with(102, "Scream", &["Horror"])
        .with(103, "Halloween", &["Horror"]);
    let fill = CategoryFillSource {
        id: FILL,
        by_category: HashMap::from([("Horror".to_string(), vec!["Halloween".to_string()])]),
    };

    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog,
        vec![
            Arc::new(ScriptedSource::new(CLAUDE, &["Heat", "Scream"])),
            Arc::new(ScriptedSource::new(CHATGPT, &["Heat"])),
        ],
        None,
        Some(Arc::new(fill)),
        settings,
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    let saved = harness.store.saved_for(OWNER);
    let titles: Vec<&str> = saved.iter().map(|r| r.metadata.title.as_str()).collect();
    assert_eq!(titles, vec!["Heat", "Scream", "Halloween"]);

    let halloween = &saved[2];
    assert!(halloween.fill);
    assert!(saved[..2].iter().all(|r| !r.fill && r.score > halloween.score));
    assert!(halloween.score < CF_WEIGHT);
    assert!((halloween.score - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_save_replaces_previous_list() {
    let store = MemoryStore::with_ratings(OWNER, ten_ratings());
    store.saved.lock().unwrap().insert(
        OWNER,
        vec![RankedRecommendation {
            metadata: movie(900, "Old Favourite", &["Drama"]),
            score: 0.8,
            sources: vec![CLAUDE],
            rationales: Vec::new(),
            fill: false,
        }],
    );

    let harness = harness(
        store,
        catalog_for(&["Heat"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Heat"]))],
        None,
        None,
        quiet_settings(),
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(saved_titles(&harness), vec!["Heat"]);
}

#[tokio::test]
async fn test_failed_save_keeps_previous_list() {
    let store = MemoryStore::with_ratings(OWNER, ten_ratings());
    store.saved.lock().unwrap().insert(
        OWNER,
        vec![RankedRecommendation {
            metadata: movie(900, "Old Favourite", &["Drama"]),
            score: 0.8,
            sources: vec![CLAUDE],
            rationales: Vec::new(),
            fill: false,
        }],
    );
    store.fail_saves.store(true, Ordering::SeqCst);

    let harness = harness(
        store,
        catalog_for(&["Heat"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Heat"]))],
        None,
        None,
        quiet_settings(),
    );

    let job = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(saved_titles(&harness), vec!["Old Favourite"]);
}

#[tokio::test]
async fn test_watched_titles_are_demoted() {
    let store = MemoryStore::with_ratings(OWNER, ten_ratings());
    store
        .watched
        .lock()
        .unwrap()
        .insert(OWNER, HashSet::from([feedmovie_api::models::TitleId::Tmdb(100)]));

    let harness = harness(
        store,
        catalog_for(&["Seen Before", "Fresh"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Seen Before", "Fresh"]))],
        None,
        None,
        quiet_settings(),
    );

    harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    let saved = harness.store.saved_for(OWNER);
    assert_eq!(saved[0].metadata.title, "Fresh");
    assert_eq!(saved[1].metadata.title, "Seen Before");
    assert!((saved[1].score - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_new_job_supersedes_live_one() {
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["Heat"]),
        vec![Arc::new(ScriptedSource::new(CLAUDE, &["Heat"]))],
        None,
        None,
        quiet_settings(),
    );

    let first = harness.pipeline.tracker().start(OWNER).await.unwrap();
    let second = harness
        .pipeline
        .generate(GenerationRequest::for_owner(OWNER), None, CancellationToken::new())
        .await
        .unwrap();

    let jobs = harness.store.jobs_for(OWNER);
    let stored_first = jobs.iter().find(|j| j.id == first.id).unwrap();
    assert_eq!(stored_first.status, JobStatus::Cancelled);
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(jobs.iter().filter(|j| !j.is_terminal()).count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_never_persists() {
    let slow: Arc<dyn OpinionSource> = Arc::new(
        ScriptedSource::new(CLAUDE, &["Heat"]).delayed(Duration::from_secs(3)),
    );
    let harness = harness(
        MemoryStore::with_ratings(OWNER, ten_ratings()),
        catalog_for(&["Heat"]),
        vec![slow],
        None,
        None,
        quiet_settings(),
    );

    let cancel = CancellationToken::new();
    let pipeline = Arc::clone(&harness.pipeline);
    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move {
        pipeline
            .generate(GenerationRequest::for_owner(OWNER), None, run_cancel)
            .await
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    let job = run.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(harness.store.saved_for(OWNER).is_empty());
    assert_eq!(harness.store.jobs_for(OWNER)[0].status, JobStatus::Cancelled);
}
