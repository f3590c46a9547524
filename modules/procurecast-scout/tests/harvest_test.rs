//! Harvester and extractor behaviour against in-memory doubles: no network,
//! no browser, no database server.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use procurecast_common::{
    Agency, DocumentType, EntityLabel, FetcherKind, NewDocument, RegistryConfig,
    SelectorOverride, SelectorOverrides,
};
use procurecast_scout::testing::{
    opportunity, FailingLinkFinder, FixedLinkFinder, MockFetcher, ScriptedRegistry,
};
use procurecast_scout::{
    extract_unprocessed, DocumentHarvester, ExtensionLinkFinder, ExtractionContext, LinkFinder,
    RegistryHarvester, Throttle,
};
use procurecast_store::MemoryStore;

const BIDS_PAGE: &str = r#"
    <ul>
      <li class="bid"><a href="/bids/2024-17">ITS Smart Corridor Design</a></li>
      <li class="bid"><a href="/bids/2024-18">Signal Priority Upgrades</a></li>
    </ul>
"#;

fn harvester(
    store: Arc<MemoryStore>,
    browser: Arc<MockFetcher>,
    http: Arc<MockFetcher>,
    finder: Arc<LinkFinder>,
) -> DocumentHarvester {
    DocumentHarvester::new(store, browser, http, finder, Arc::new(Throttle::unthrottled()))
        .with_concurrency(2)
}

fn bid_rule(fetcher: FetcherKind) -> SelectorOverride {
    SelectorOverride {
        item_selector: Some("li.bid".into()),
        procurement_url: Some("https://ridemetro.example/procurement".into()),
        fetcher,
    }
}

#[tokio::test]
async fn rerunning_a_listing_page_stores_nothing_new() {
    let store = Arc::new(MemoryStore::new());
    store.add_agency(Agency::new(1, "METRO (Houston)"));
    let browser = Arc::new(MockFetcher::new().on_page("https://ridemetro.example/procurement", BIDS_PAGE));
    let mut overrides = SelectorOverrides::default();
    overrides.insert("METRO (Houston)", bid_rule(FetcherKind::Browser));

    let h = harvester(
        store.clone(),
        browser.clone(),
        Arc::new(MockFetcher::new()),
        Arc::new(ExtensionLinkFinder::pdf()),
    )
    .with_overrides(overrides);

    let first = h.run(None).await.unwrap();
    assert_eq!(first.inserted, 2);
    let count_after_first = store.documents().len();

    let second = h.run(None).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.already_stored, 2);
    assert_eq!(store.documents().len(), count_after_first);

    let docs = store.documents();
    let doc = &docs[0].document;
    assert_eq!(doc.document_type, DocumentType::Solicitation);
    assert_eq!(doc.url, "https://ridemetro.example/bids/2024-17");
    assert_eq!(
        doc.raw_text.as_deref(),
        Some("Title: ITS Smart Corridor Design\nURL: https://ridemetro.example/bids/2024-17")
    );
    assert_eq!(doc.publication_date, Utc::now().date_naive());
}

#[tokio::test]
async fn http_fetcher_override_bypasses_the_browser() {
    let store = Arc::new(MemoryStore::new());
    store.add_agency(Agency::new(1, "METRO (Houston)"));
    let browser = Arc::new(MockFetcher::new());
    let http = Arc::new(MockFetcher::new().on_page("https://ridemetro.example/procurement", BIDS_PAGE));
    let mut overrides = SelectorOverrides::default();
    overrides.insert("METRO (Houston)", bid_rule(FetcherKind::Http));

    let stats = harvester(store.clone(), browser.clone(), http.clone(), Arc::new(ExtensionLinkFinder::pdf()))
        .with_overrides(overrides)
        .run(None)
        .await
        .unwrap();

    assert_eq!(stats.inserted, 2);
    assert!(browser.requests().is_empty());
    assert_eq!(http.request_count("https://ridemetro.example/procurement"), 1);
}

#[tokio::test]
async fn stored_links_are_not_downloaded_and_bad_items_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    store.add_agency(Agency::new(1, "Capital Area MPO").with_planning_url("https://campo.example.gov/plans"));
    store.add_document(NewDocument {
        agency_id: 1,
        document_type: DocumentType::PlanningDocument,
        url: "https://campo.example.gov/docs/known.pdf".into(),
        raw_text: Some("already harvested".into()),
        scraped_at: Utc::now(),
        publication_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    });

    let browser = Arc::new(
        MockFetcher::new()
            .on_page("https://campo.example.gov/plans", "<html></html>")
            .on_resource("https://campo.example.gov/docs/agenda.pdf", "text/html", b"<html>login</html>")
            .on_resource("https://campo.example.gov/docs/broken.pdf", "application/pdf", b"%PDF-1.4 truncated"),
    );
    let finder = Arc::new(FixedLinkFinder::new(&[
        "https://campo.example.gov/docs/known.pdf",
        "https://campo.example.gov/docs/agenda.pdf",
        "https://campo.example.gov/docs/broken.pdf",
        "https://campo.example.gov/docs/missing.pdf",
    ]));

    let stats = harvester(store.clone(), browser.clone(), Arc::new(MockFetcher::new()), finder)
        .run(None)
        .await
        .unwrap();

    assert_eq!(browser.request_count("https://campo.example.gov/docs/known.pdf"), 0);
    assert_eq!(stats.items_found, 4);
    assert_eq!(stats.already_stored, 1);
    // non-PDF content type and unreadable PDF
    assert_eq!(stats.skipped, 2);
    // 404
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.inserted, 0);
    assert_eq!(store.documents().len(), 1);
}

#[tokio::test]
async fn one_broken_agency_does_not_stop_the_batch() {
    let store = Arc::new(MemoryStore::new());
    store.add_agency(Agency::new(1, "Broken Site COG").with_planning_url("https://broken.example.gov/plans"));
    store.add_agency(Agency::new(2, "METRO (Houston)"));
    let browser = Arc::new(MockFetcher::new().on_page("https://ridemetro.example/procurement", BIDS_PAGE));
    let mut overrides = SelectorOverrides::default();
    overrides.insert("METRO (Houston)", bid_rule(FetcherKind::Browser));

    let stats = harvester(store.clone(), browser, Arc::new(MockFetcher::new()), Arc::new(ExtensionLinkFinder::pdf()))
        .with_overrides(overrides)
        .run(None)
        .await
        .unwrap();

    assert_eq!(stats.agencies, 2);
    assert_eq!(stats.pages_failed, 1);
    assert_eq!(stats.inserted, 2);
}

#[tokio::test]
async fn link_finder_failure_is_counted_not_raised() {
    let store = Arc::new(MemoryStore::new());
    store.add_agency(Agency::new(1, "Capital Area MPO").with_minutes_url("https://campo.example.gov/minutes"));
    let browser = Arc::new(MockFetcher::new().on_page("https://campo.example.gov/minutes", "<html></html>"));

    let stats = harvester(store.clone(), browser, Arc::new(MockFetcher::new()), Arc::new(FailingLinkFinder))
        .run(Some(&[1]))
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(stats.failed, 1);
    assert!(store.documents().is_empty());
}

#[tokio::test]
async fn extraction_runs_once_per_document() {
    let store = MemoryStore::new();
    store.add_agency(Agency::new(1, "Capital Area MPO"));
    let with_signals = store.add_document(NewDocument {
        agency_id: 1,
        document_type: DocumentType::PlanningDocument,
        url: "https://campo.example.gov/docs/mtp.pdf".into(),
        raw_text: Some(
            "The plan funds Connected Vehicles pilots. The Texas Department of Transportation committed $4 million in FY 2025."
                .into(),
        ),
        scraped_at: Utc::now(),
        publication_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    });
    store.add_document(NewDocument {
        agency_id: 1,
        document_type: DocumentType::MeetingMinutes,
        url: "https://campo.example.gov/docs/empty.pdf".into(),
        raw_text: None,
        scraped_at: Utc::now(),
        publication_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    });
    let ctx = ExtractionContext::new().unwrap();

    let first = extract_unprocessed(&store, &ctx).await.unwrap();
    assert_eq!(first.documents, 1);
    assert!(first.entities >= 4);

    let entities = store.entities();
    assert!(entities.iter().all(|e| e.entity.source_id == with_signals));
    let labels: Vec<EntityLabel> = entities.iter().map(|e| e.entity.label).collect();
    for label in [EntityLabel::ItsTechnology, EntityLabel::Money, EntityLabel::Date, EntityLabel::Org] {
        assert!(labels.contains(&label), "missing {label}");
    }
    let cv = entities
        .iter()
        .find(|e| e.entity.label == EntityLabel::ItsTechnology)
        .unwrap();
    assert_eq!(cv.entity.entity_text, "Connected Vehicles");
    assert_eq!(cv.entity.context_sentence, "The plan funds Connected Vehicles pilots.");

    let second = extract_unprocessed(&store, &ctx).await.unwrap();
    assert_eq!(second.documents, 0);
    assert_eq!(store.entities().len(), entities.len());
}

fn registry_config(page_size: usize) -> RegistryConfig {
    RegistryConfig {
        years: 1,
        page_size,
        naics_codes: vec!["541512".into(), "541330".into()],
        ..Default::default()
    }
}

#[tokio::test]
async fn a_failing_registry_code_does_not_stop_its_siblings() {
    let store = Arc::new(MemoryStore::new());
    store.add_agency(Agency::new(1, "DEPT OF TRANSPORTATION.FEDERAL TRANSIT ADMINISTRATION"));
    let registry = Arc::new(
        ScriptedRegistry::new()
            .failing("541512")
            .on_page(
                "541330",
                0,
                vec![
                    opportunity("federal transit", "2024-02-01", "https://sam.test/opp/1"),
                    opportunity("federal transit", "2024-03-01", "https://sam.test/opp/2"),
                ],
            )
            .on_page(
                "541330",
                2,
                vec![opportunity("NASA", "2024-04-01", "https://sam.test/opp/3")],
            ),
    );

    let stats = RegistryHarvester::with_source(store.clone(), registry.clone(), registry_config(2))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.pages_failed, 1);
    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.inserted, 3);

    let stored = store.solicitations();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].agency_id, Some(1));
    assert_eq!(stored[2].agency_id, None);
    assert!(stored.iter().all(|s| s.keywords == vec!["541330".to_string()]));

    let offsets: Vec<usize> = registry
        .queries()
        .iter()
        .filter(|q| q.code == "541330")
        .map(|q| q.offset)
        .collect();
    assert_eq!(offsets, vec![0, 2]);
}

#[tokio::test]
async fn registry_paging_stops_on_an_empty_page_even_with_zero_page_size() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(
        ScriptedRegistry::new()
            .on_page("541330", 0, vec![opportunity("NASA", "2024-01-05", "https://sam.test/opp/1")])
            .on_page("541330", 1, vec![opportunity("NASA", "2024-01-06", "https://sam.test/opp/2")]),
    );

    let stats = RegistryHarvester::with_source(store.clone(), registry.clone(), registry_config(0))
        .run()
        .await
        .unwrap();

    // two scripted pages, then the empty one that ends the loop; 541512 is empty at once
    assert_eq!(stats.pages_fetched, 4);
    assert_eq!(stats.inserted, 2);
    assert!(registry.queries().iter().all(|q| q.limit == 1));
}
