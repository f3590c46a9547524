//! SqlStore against in-memory SQLite: the same query builders production
//! uses, minus the server.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde_json::json;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use procurecast_common::types::{
    BacktestResult, DocumentType, EntityLabel, InsertOutcome, NewDocument, NewEntity,
    NewNewsArticle, NewSolicitation, Prediction,
};
use procurecast_store::{ProcurementStore, SqlStore, Sqlite};

const SCHEMA: &[&str] = &[
    "CREATE TABLE agencies ( agency_id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, state TEXT, agency_type TEXT, procurement_url TEXT, planning_url TEXT, minutes_url TEXT, latitude REAL, longitude REAL )",
    "CREATE TABLE documents ( document_id INTEGER PRIMARY KEY AUTOINCREMENT, agency_id INTEGER, raw_text TEXT, document_type TEXT, url TEXT UNIQUE, local_path TEXT, scraped_date TEXT, publication_date TEXT )",
    "CREATE TABLE extracted_entities ( entity_id INTEGER PRIMARY KEY AUTOINCREMENT, source_id INTEGER, source_type TEXT, entity_text TEXT, entity_label TEXT, context_sentence TEXT, validation_status TEXT NOT NULL DEFAULT 'unverified' )",
    "CREATE TABLE news_articles ( article_id INTEGER PRIMARY KEY AUTOINCREMENT, agency_id INTEGER, article_url TEXT UNIQUE NOT NULL, title TEXT, source_name TEXT, published_date TEXT, content TEXT )",
    "CREATE TABLE predictions ( prediction_id INTEGER PRIMARY KEY AUTOINCREMENT, agency_id INTEGER, prediction_date TEXT, prob_6_months REAL, prob_12_months REAL, supporting_evidence TEXT )",
    "CREATE TABLE agency_relationships ( relationship_id INTEGER PRIMARY KEY AUTOINCREMENT, parent_agency_id INTEGER NOT NULL, child_agency_id INTEGER NOT NULL, structure_id INTEGER NOT NULL, UNIQUE(parent_agency_id, child_agency_id, structure_id) )",
    "CREATE TABLE historical_solicitations ( solicitation_id INTEGER PRIMARY KEY AUTOINCREMENT, agency_id INTEGER, release_date TEXT NOT NULL, title TEXT, url TEXT UNIQUE, keywords TEXT )",
    "CREATE TABLE backtest_results ( result_id INTEGER PRIMARY KEY AUTOINCREMENT, simulation_date TEXT NOT NULL, agency_id INTEGER, predicted_prob_12m REAL, actual_outcome_12m INTEGER, time_to_event_days INTEGER, UNIQUE(simulation_date, agency_id) )",
];

async fn test_store() -> (SqlStore, AnyPool) {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    (SqlStore::new(pool.clone(), Box::new(Sqlite)), pool)
}

async fn seed_agency(pool: &AnyPool, name: &str, state: &str, agency_type: &str) -> i64 {
    let (agency_id,): (i64,) = sqlx::query_as("INSERT INTO agencies (name, state, agency_type, procurement_url) VALUES (?, ?, ?, ?) RETURNING agency_id")
        .bind(name)
        .bind(state)
        .bind(agency_type)
        .bind(format!("https://{}.example.gov/bids", name.len()))
        .fetch_one(pool)
        .await
        .unwrap();
    agency_id
}

async fn seed_edge(pool: &AnyPool, parent: i64, child: i64, structure: i64) {
    sqlx::query("INSERT OR IGNORE INTO agency_relationships (parent_agency_id, child_agency_id, structure_id) VALUES (?, ?, ?)")
        .bind(parent)
        .bind(child)
        .bind(structure)
        .execute(pool)
        .await
        .unwrap();
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn document(agency_id: i64, url: &str, text: Option<&str>, published: NaiveDate) -> NewDocument {
    NewDocument {
        agency_id,
        document_type: DocumentType::PlanningDocument,
        url: url.to_string(),
        raw_text: text.map(String::from),
        scraped_at: Utc::now(),
        publication_date: published,
    }
}

#[tokio::test]
async fn document_insert_is_conditional_on_url() {
    let (store, pool) = test_store().await;
    let agency = seed_agency(&pool, "Houston-Galveston Area Council", "TX", "COG").await;
    let doc = document(agency, "https://h-gac.example.gov/rtp.pdf", Some("plan text"), date(2024, 1, 2));

    assert_eq!(store.insert_document(&doc).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(store.insert_document(&doc).await.unwrap(), InsertOutcome::AlreadyPresent);
    assert!(store.document_exists(&doc.url).await.unwrap());
    assert!(!store.document_exists("https://h-gac.example.gov/other.pdf").await.unwrap());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn agency_lookups_are_case_insensitive_and_lowest_id_first() {
    let (store, pool) = test_store().await;
    let parent = seed_agency(&pool, "Houston-Galveston Area Council", "TX", "COG").await;
    let _later = seed_agency(&pool, "Houston-Galveston Area Council Transit", "TX", "Transit").await;
    let child = seed_agency(&pool, "City of Houston", "TX", "City").await;
    let dot = seed_agency(&pool, "Texas Department of Transportation", "TX", "State DOT").await;
    seed_edge(&pool, parent, child, 1).await;
    seed_edge(&pool, parent, child, 2).await;

    let found = store.find_agency_by_name("houston-galveston").await.unwrap().unwrap();
    assert_eq!(found.agency_id, parent);
    assert_eq!(found.state.as_deref(), Some("TX"));
    assert!(store.find_agency_by_name("  ").await.unwrap().is_none());

    assert_eq!(store.child_agency_ids(parent).await.unwrap(), vec![child]);
    assert_eq!(store.state_dot("TX").await.unwrap(), Some(dot));
    assert_eq!(store.state_dot("OK").await.unwrap(), None);

    let subset = store.agencies(Some(&[dot, parent])).await.unwrap();
    assert_eq!(subset.iter().map(|a| a.agency_id).collect::<Vec<_>>(), vec![parent, dot]);
    assert!(store.agencies(Some(&[])).await.unwrap().is_empty());
    assert_eq!(store.agencies(None).await.unwrap().len(), 4);
    assert_eq!(store.sample_agencies(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn entity_counts_respect_validation_and_strict_cutoff() {
    let (store, pool) = test_store().await;
    let agency = seed_agency(&pool, "Capital Area MPO", "TX", "MPO").await;

    store
        .insert_document(&document(agency, "https://campo.example.gov/old.pdf", Some("old"), date(2019, 6, 1)))
        .await
        .unwrap();
    store
        .insert_document(&document(agency, "https://campo.example.gov/new.pdf", Some("new"), date(2020, 1, 1)))
        .await
        .unwrap();

    let unprocessed = store.unprocessed_documents().await.unwrap();
    assert_eq!(unprocessed.len(), 2);

    let entities: Vec<NewEntity> = unprocessed
        .iter()
        .map(|d| NewEntity {
            source_id: d.document_id,
            entity_text: "V2X".to_string(),
            label: EntityLabel::ItsTechnology,
            context_sentence: "Deploy V2X.".to_string(),
        })
        .collect();
    assert_eq!(store.insert_entities(&entities).await.unwrap(), 2);
    assert!(store.unprocessed_documents().await.unwrap().is_empty());

    // Unverified entities never count
    assert!(store.validated_entity_counts(None).await.unwrap().is_empty());

    sqlx::query("UPDATE extracted_entities SET validation_status = 'correct'")
        .execute(&pool)
        .await
        .unwrap();

    let live = store.validated_entity_counts(None).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].count, 2);
    assert_eq!(live[0].document_type, "Planning Document");
    assert_eq!(live[0].entity_label, "ITS_TECHNOLOGY");

    // A document published on the cutoff is excluded
    let as_of = store.validated_entity_counts(Some(date(2020, 1, 1))).await.unwrap();
    assert_eq!(as_of[0].count, 1);
    assert!(store
        .validated_entity_counts(Some(date(2019, 6, 1)))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn solicitations_dedup_by_url_and_keep_unmatched_rows() {
    let (store, pool) = test_store().await;
    let agency = seed_agency(&pool, "Harris County", "TX", "County").await;

    let matched = NewSolicitation {
        agency_id: Some(agency),
        release_date: date(2022, 3, 4),
        title: "Adaptive signal control".to_string(),
        url: "https://sam.gov/opp/abc".to_string(),
        keywords: vec!["541512".to_string()],
    };
    let unmatched = NewSolicitation {
        agency_id: None,
        url: "https://sam.gov/opp/def".to_string(),
        ..matched.clone()
    };

    assert!(store.insert_solicitation(&matched).await.unwrap().is_inserted());
    assert!(!store.insert_solicitation(&matched).await.unwrap().is_inserted());
    assert!(store.insert_solicitation(&unmatched).await.unwrap().is_inserted());

    let dates = store.solicitation_dates().await.unwrap();
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].agency_id, agency);
    assert_eq!(dates[0].release_date, date(2022, 3, 4));

    let (keywords,): (String,) = sqlx::query_as("SELECT keywords FROM historical_solicitations WHERE url = ?")
        .bind("https://sam.gov/opp/abc")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(keywords, "541512");
}

#[tokio::test]
async fn predictions_are_fully_replaced() {
    let (store, pool) = test_store().await;
    let a = seed_agency(&pool, "Agency A", "TX", "City").await;
    let b = seed_agency(&pool, "Agency B", "TX", "City").await;

    let first = vec![
        Prediction {
            agency_id: a,
            prediction_date: date(2024, 1, 1),
            prob_6_months: None,
            prob_12_months: 0.4,
            supporting_evidence: json!({"planning_doc_its_mentions": 3.0}),
        },
        Prediction {
            agency_id: b,
            prediction_date: date(2024, 1, 1),
            prob_6_months: None,
            prob_12_months: 0.9,
            supporting_evidence: json!({}),
        },
    ];
    assert_eq!(store.replace_predictions(&first).await.unwrap(), 2);

    let second = vec![Prediction {
        agency_id: b,
        prediction_date: date(2024, 2, 1),
        prob_6_months: None,
        prob_12_months: 0.7,
        supporting_evidence: json!({"planning_doc_its_mentions": 1.0}),
    }];
    store.replace_predictions(&second).await.unwrap();

    let stored = store.predictions().await.unwrap();
    assert_eq!(stored, second);
}

#[tokio::test]
async fn verifier_candidates_skip_recent_solicitations() {
    let (store, pool) = test_store().await;
    let recent = seed_agency(&pool, "Recently Active", "TX", "City").await;
    let quiet = seed_agency(&pool, "Quiet Agency", "TX", "City").await;
    let low = seed_agency(&pool, "Low Probability", "TX", "City").await;

    let today = date(2024, 6, 1);
    store
        .replace_predictions(&[
            Prediction {
                agency_id: recent,
                prediction_date: today,
                prob_6_months: None,
                prob_12_months: 0.8,
                supporting_evidence: json!({}),
            },
            Prediction {
                agency_id: quiet,
                prediction_date: today,
                prob_6_months: None,
                prob_12_months: 0.8,
                supporting_evidence: json!({}),
            },
            Prediction {
                agency_id: low,
                prediction_date: today,
                prob_6_months: None,
                prob_12_months: 0.5,
                supporting_evidence: json!({}),
            },
        ])
        .await
        .unwrap();

    for (agency, days_ago, url) in [(recent, 10, "https://sam.gov/r"), (quiet, 90, "https://sam.gov/q")] {
        store
            .insert_solicitation(&NewSolicitation {
                agency_id: Some(agency),
                release_date: today - Duration::days(days_ago),
                title: "RFP".to_string(),
                url: url.to_string(),
                keywords: Vec::new(),
            })
            .await
            .unwrap();
    }

    let candidates = store
        .verifier_candidates(0.75, today - Duration::days(60), 5)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].agency_id, quiet);
    assert_eq!(candidates[0].name, "Quiet Agency");
}

#[tokio::test]
async fn thin_documents_flag_null_and_short_text_in_window() {
    let (store, pool) = test_store().await;
    let agency = seed_agency(&pool, "North Central Texas COG", "TX", "COG").await;
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();

    let mut docs = vec![
        document(agency, "https://nctcog.example.gov/empty.pdf", None, date(2024, 6, 9)),
        document(agency, "https://nctcog.example.gov/short.pdf", Some("Title: x"), date(2024, 6, 9)),
        document(agency, "https://nctcog.example.gov/full.pdf", Some(&"a".repeat(150)), date(2024, 6, 9)),
        document(agency, "https://nctcog.example.gov/stale.pdf", None, date(2024, 5, 1)),
    ];
    docs[0].scraped_at = now - Duration::days(1);
    docs[1].scraped_at = now - Duration::days(2);
    docs[2].scraped_at = now - Duration::days(1);
    docs[3].scraped_at = now - Duration::days(30);
    for doc in &docs {
        store.insert_document(doc).await.unwrap();
    }

    let suspects = store.thin_documents(now - Duration::days(7), 100).await.unwrap();
    let urls: Vec<&str> = suspects.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://nctcog.example.gov/empty.pdf", "https://nctcog.example.gov/short.pdf"]
    );
    assert_eq!(suspects[0].text_chars, None);
    assert_eq!(suspects[1].text_chars, Some(8));
    assert_eq!(suspects[0].scraped_at, now - Duration::days(1));
}

#[tokio::test]
async fn backtest_results_upsert_on_date_and_agency() {
    let (store, pool) = test_store().await;
    let agency = seed_agency(&pool, "Fort Bend County", "TX", "County").await;

    let mut result = BacktestResult {
        simulation_date: date(2015, 1, 1),
        agency_id: agency,
        predicted_prob_12m: 0.3,
        actual_outcome_12m: false,
        time_to_event_days: None,
    };
    store.record_backtest_results(&[result.clone()]).await.unwrap();

    result.predicted_prob_12m = 0.6;
    result.actual_outcome_12m = true;
    result.time_to_event_days = Some(120);
    store.record_backtest_results(&[result]).await.unwrap();

    let rows: Vec<(f64, i64, Option<i64>)> = sqlx::query_as(
        "SELECT predicted_prob_12m, actual_outcome_12m, time_to_event_days FROM backtest_results",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows, vec![(0.6, 1, Some(120))]);
}

#[tokio::test]
async fn news_articles_dedup_by_url() {
    let (store, pool) = test_store().await;
    let agency = seed_agency(&pool, "METRO (Houston)", "TX", "Transit").await;

    let article = NewNewsArticle {
        agency_id: agency,
        article_url: "https://news.example.com/metro-brt".to_string(),
        title: "METRO advances BRT corridor".to_string(),
        source_name: Some("Example News".to_string()),
        published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
        content: None,
    };
    assert!(store.insert_news_article(&article).await.unwrap().is_inserted());
    assert_eq!(
        store.insert_news_article(&article).await.unwrap(),
        InsertOutcome::AlreadyPresent
    );
}
