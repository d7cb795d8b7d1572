//! End-to-end import flows against the in-memory store and scripted probes
//!
//! Covers the TED datasource scenarios (Postgres, MySQL and Mongo reconnected
//! before the application becomes visible), retries after failed connection
//! tests, early finalize, and the concurrency guarantees of reconnection.

use async_trait::async_trait;
use relink_core::{CredentialCipher, ImportConfig};
use relink_import::{ImportOrchestrator, ImportServiceError, InMemoryWorkspaceStore};
use relink_import_types::{
    BundleSource, ConnectivityProbe, DatasourceCredentials, DatasourceType, ImportError,
    ImportState, MongoCredentials, NewDatasource, ProbeError, ProbeRegistry,
    ReconnectionStatus, SqlCredentials, WorkspaceId, WorkspaceStore,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TED_BUNDLE: &str = r#"{
    "clientSchemaVersion": 1,
    "serverSchemaVersion": 6,
    "exportedApplication": { "name": "gitImport" },
    "datasourceList": [
        { "name": "TEDPostgres", "pluginId": "postgres-plugin" },
        { "name": "TEDMySQL", "pluginId": "mysql-plugin" },
        { "name": "TEDMongo", "pluginId": "mongo-plugin" }
    ],
    "pageList": [{ "name": "Page1" }],
    "actionList": [
        { "name": "get_users", "datasourceName": "TEDPostgres" },
        { "name": "get_orders", "datasourceName": "TEDMySQL" },
        { "name": "find_events", "datasourceName": "TEDMongo" }
    ]
}"#;

/// Probe that fails a set number of times, sleeps, and tracks concurrency
struct ScriptedProbe {
    datasource_type: DatasourceType,
    failures_left: AtomicU32,
    delay: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    fn new(datasource_type: DatasourceType) -> Arc<Self> {
        Self::build(datasource_type, 0, Duration::ZERO)
    }

    fn build(datasource_type: DatasourceType, failures: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            datasource_type,
            failures_left: AtomicU32::new(failures),
            delay,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    fn datasource_type(&self) -> DatasourceType {
        self.datasource_type
    }

    async fn probe(&self, _credentials: &DatasourceCredentials) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ProbeError::AuthenticationFailed(
                "password authentication failed for user \"docker\"".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    store: Arc<InMemoryWorkspaceStore>,
    orchestrator: Arc<ImportOrchestrator>,
    workspace_id: WorkspaceId,
}

async fn harness(probes: Vec<Arc<ScriptedProbe>>) -> Harness {
    let store = Arc::new(InMemoryWorkspaceStore::new());
    let workspace = store.create_workspace("TED workspace").await.unwrap();
    let mut registry = ProbeRegistry::new();
    for probe in probes {
        registry.register(probe);
    }
    let orchestrator = Arc::new(ImportOrchestrator::new(
        store.clone(),
        registry,
        Arc::new(CredentialCipher::from_passphrase("integration")),
        &ImportConfig::default(),
    ));
    Harness {
        store,
        orchestrator,
        workspace_id: workspace.id,
    }
}

fn postgres() -> DatasourceCredentials {
    DatasourceCredentials::Postgres(SqlCredentials {
        host: "localhost".to_string(),
        port: 5432,
        database: "fakeapi".to_string(),
        username: "docker".to_string(),
        password: "docker".to_string(),
        ssl: false,
    })
}

fn mysql() -> DatasourceCredentials {
    DatasourceCredentials::MySql(SqlCredentials {
        host: "localhost".to_string(),
        port: 3306,
        database: "fakeapi".to_string(),
        username: "root".to_string(),
        password: "root".to_string(),
        ssl: false,
    })
}

fn mongo() -> DatasourceCredentials {
    DatasourceCredentials::Mongo(MongoCredentials {
        connection_url: Some("mongodb://localhost:27017/ted".to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_ted_datasources_reconnect_then_finalize() {
    // Arrange
    let h = harness(vec![
        ScriptedProbe::new(DatasourceType::Postgres),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let status = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap();
    let draft_id = status.draft_id;
    let names: Vec<_> = status
        .reconnections
        .iter()
        .map(|r| r.datasource_name.as_str())
        .collect();
    assert_eq!(names, vec!["TEDPostgres", "TEDMySQL", "TEDMongo"]);

    // Act
    h.orchestrator
        .reconnect("ted", draft_id, "TEDPostgres", postgres())
        .await
        .unwrap();
    h.orchestrator
        .reconnect("ted", draft_id, "TEDMySQL", mysql())
        .await
        .unwrap();
    h.orchestrator
        .reconnect("ted", draft_id, "TEDMongo", mongo())
        .await
        .unwrap();
    let result = h.orchestrator.finalize("ted", draft_id).await.unwrap();

    // Assert
    assert!(result.success);
    assert_eq!(result.unresolved_count, 0);
    let apps = h.store.list_applications(h.workspace_id).await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "gitImport");
    assert_eq!(Some(apps[0].id), result.application_id);
    assert!(apps[0].datasource_bindings.values().all(Option::is_some));
    assert_eq!(h.store.list_datasources(h.workspace_id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_probe_failing_twice_then_succeeding_allows_finalize() {
    // Arrange
    let flaky = ScriptedProbe::build(DatasourceType::Postgres, 2, Duration::ZERO);
    let h = harness(vec![
        flaky.clone(),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;
    h.orchestrator
        .reconnect("ted", draft_id, "TEDMySQL", mysql())
        .await
        .unwrap();
    h.orchestrator
        .skip("ted", draft_id, "TEDMongo")
        .await
        .unwrap();

    // Act
    let first = h
        .orchestrator
        .reconnect("ted", draft_id, "TEDPostgres", postgres())
        .await;
    let second = h
        .orchestrator
        .reconnect("ted", draft_id, "TEDPostgres", postgres())
        .await;
    let blocked = h.orchestrator.finalize("ted", draft_id).await;
    let third = h
        .orchestrator
        .reconnect("ted", draft_id, "TEDPostgres", postgres())
        .await;
    let result = h.orchestrator.finalize("ted", draft_id).await.unwrap();

    // Assert
    assert!(matches!(
        first,
        Err(ImportServiceError::Import(ImportError::Validation(_)))
    ));
    assert!(second.is_err());
    match blocked {
        Err(ImportServiceError::Import(ImportError::UnresolvedDependencies { pending })) => {
            assert_eq!(pending, vec!["TEDPostgres".to_string()])
        }
        other => panic!("a failed record must block finalize, got {:?}", other),
    }
    assert!(third.is_ok());
    assert_eq!(flaky.calls(), 3);
    assert!(result.success);
    assert_eq!(result.unresolved_count, 1);

    let status = h.orchestrator.status("ted", draft_id).await.unwrap();
    let postgres_record = &status.reconnections[0];
    assert_eq!(postgres_record.status, ReconnectionStatus::Resolved);
    assert_eq!(postgres_record.attempts, 3);
    assert!(postgres_record.last_error.is_none());
}

#[tokio::test]
async fn test_early_finalize_keeps_draft_importable() {
    // Arrange
    let h = harness(vec![
        ScriptedProbe::new(DatasourceType::Postgres),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let early = h.orchestrator.finalize("ted", draft_id).await;

    // Assert
    match early {
        Err(ImportServiceError::Import(ImportError::UnresolvedDependencies { pending })) => {
            assert_eq!(pending, vec!["TEDPostgres", "TEDMySQL", "TEDMongo"]);
        }
        other => panic!("expected UnresolvedDependencies, got {:?}", other),
    }
    assert!(h.store.draft(draft_id).await.is_some());
    assert!(h.store.list_applications(h.workspace_id).await.unwrap().is_empty());

    // The same import can still be completed
    for name in ["TEDPostgres", "TEDMySQL", "TEDMongo"] {
        h.orchestrator.skip("ted", draft_id, name).await.unwrap();
    }
    let result = h.orchestrator.finalize("ted", draft_id).await.unwrap();
    assert_eq!(result.unresolved_count, 3);
}

#[tokio::test]
async fn test_existing_datasources_need_no_reconnection() {
    // Arrange
    let h = harness(vec![
        ScriptedProbe::new(DatasourceType::Postgres),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let first = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;
    h.orchestrator
        .reconnect("ted", first, "TEDPostgres", postgres())
        .await
        .unwrap();
    h.orchestrator.cancel("ted", first).await.unwrap();

    // Act
    let second = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap();

    // Assert
    assert_eq!(second.existing_datasources, vec!["TEDPostgres".to_string()]);
    let names: Vec<_> = second
        .reconnections
        .iter()
        .map(|r| r.datasource_name.as_str())
        .collect();
    assert_eq!(names, vec!["TEDMySQL", "TEDMongo"]);
}

#[tokio::test]
async fn test_git_import_tracks_requested_branch() {
    // Arrange
    let h = harness(vec![]).await;
    let bundle = r#"{
        "serverSchemaVersion": 6,
        "exportedApplication": { "name": "gitImport" },
        "pageList": [{ "name": "Page1" }]
    }"#;
    let source = BundleSource::Git {
        repository_url: "git@github.com:ted/git-import.git".to_string(),
        branch: Some("feature/reconnect".to_string()),
    };

    // Act
    let status = h
        .orchestrator
        .start_import("ted", h.workspace_id, bundle.as_bytes(), source)
        .await
        .unwrap();
    let result = h
        .orchestrator
        .finalize("ted", status.draft_id)
        .await
        .unwrap();

    // Assert
    assert!(status.reconnections.is_empty());
    assert_eq!(result.unresolved_count, 0);
    let apps = h.store.list_applications(h.workspace_id).await.unwrap();
    let git = apps[0].git.as_ref().unwrap();
    assert_eq!(git.branch, "feature/reconnect");
    assert_eq!(git.repository_url, "git@github.com:ted/git-import.git");
}

#[tokio::test]
async fn test_distinct_datasources_probe_concurrently() {
    // Arrange
    let slow = Duration::from_millis(200);
    let postgres_probe = ScriptedProbe::build(DatasourceType::Postgres, 0, slow);
    let mysql_probe = ScriptedProbe::build(DatasourceType::MySql, 0, slow);
    let h = harness(vec![
        postgres_probe.clone(),
        mysql_probe.clone(),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let started = tokio::time::Instant::now();
    let (a, b) = tokio::join!(
        h.orchestrator
            .reconnect("ted", draft_id, "TEDPostgres", postgres()),
        h.orchestrator.reconnect("ted", draft_id, "TEDMySQL", mysql()),
    );
    let elapsed = started.elapsed();

    // Assert
    assert!(a.is_ok() && b.is_ok());
    assert!(
        elapsed < slow * 2,
        "distinct datasources should not wait on each other, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_same_datasource_reconnects_serialize() {
    // Arrange
    let probe = ScriptedProbe::build(DatasourceType::Postgres, 0, Duration::from_millis(100));
    let h = harness(vec![
        probe.clone(),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let (a, b) = tokio::join!(
        h.orchestrator
            .reconnect("ted", draft_id, "TEDPostgres", postgres()),
        h.orchestrator
            .reconnect("ted", draft_id, "TEDPostgres", postgres()),
    );

    // Assert
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.id, b.id, "second call sees the first call's datasource");
    assert_eq!(probe.calls(), 1);
    assert_eq!(probe.max_in_flight(), 1);
    assert_eq!(h.store.list_datasources(h.workspace_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_same_name_across_imports_binds_one_datasource() {
    // Arrange
    let probe = ScriptedProbe::build(DatasourceType::Postgres, 0, Duration::from_millis(50));
    let h = harness(vec![
        probe.clone(),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let alice = h
        .orchestrator
        .start_import("alice", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;
    let bob = h
        .orchestrator
        .start_import("bob", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let (a, b) = tokio::join!(
        h.orchestrator
            .reconnect("alice", alice, "TEDPostgres", postgres()),
        h.orchestrator.reconnect("bob", bob, "TEDPostgres", postgres()),
    );

    // Assert
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.id, b.id);
    let stored = h.store.list_datasources(h.workspace_id).await.unwrap();
    assert_eq!(
        stored.iter().filter(|d| d.name == "TEDPostgres").count(),
        1
    );
}

#[tokio::test]
async fn test_import_losing_name_race_still_finalizes_fully_bound() {
    // Arrange
    let h = harness(vec![
        ScriptedProbe::build(DatasourceType::Postgres, 0, Duration::from_millis(50)),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let alice = h
        .orchestrator
        .start_import("alice", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;
    let bob = h
        .orchestrator
        .start_import("bob", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;
    let (winner, _) = tokio::join!(
        h.orchestrator
            .reconnect("alice", alice, "TEDPostgres", postgres()),
        h.orchestrator.reconnect("bob", bob, "TEDPostgres", postgres()),
    );
    let winner = winner.unwrap();

    // Act
    h.orchestrator
        .reconnect("bob", bob, "TEDMySQL", mysql())
        .await
        .unwrap();
    h.orchestrator
        .reconnect("bob", bob, "TEDMongo", mongo())
        .await
        .unwrap();
    let result = h.orchestrator.finalize("bob", bob).await.unwrap();

    // Assert
    assert!(result.success);
    assert_eq!(result.unresolved_count, 0);
    let status = h.orchestrator.status("bob", bob).await.unwrap();
    assert!(status
        .reconnections
        .iter()
        .all(|r| r.status == ReconnectionStatus::Resolved));
    let applications = h.store.list_applications(h.workspace_id).await.unwrap();
    assert_eq!(applications.len(), 1);
    assert_eq!(
        applications[0].datasource_bindings.get("TEDPostgres"),
        Some(&Some(winner.id))
    );
    assert!(applications[0]
        .datasource_bindings
        .values()
        .all(Option::is_some));
}

#[tokio::test]
async fn test_same_name_of_other_type_stays_a_conflict() {
    // Arrange
    let h = harness(vec![ScriptedProbe::new(DatasourceType::Postgres)]).await;
    h.store
        .persist_datasource(NewDatasource {
            workspace_id: h.workspace_id,
            name: "TEDPostgres".to_string(),
            datasource_type: DatasourceType::Mongo,
            encrypted_credentials: String::new(),
        })
        .await
        .unwrap();
    let bundle = r#"{
        "serverSchemaVersion": 6,
        "exportedApplication": { "name": "single" },
        "datasourceList": [{ "name": "TEDPostgres", "pluginId": "postgres-plugin" }],
        "pageList": [{ "name": "Page1" }]
    }"#;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, bundle.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let result = h
        .orchestrator
        .reconnect("ted", draft_id, "TEDPostgres", postgres())
        .await;

    // Assert
    assert!(matches!(
        result,
        Err(ImportServiceError::Import(ImportError::ConflictingDatasourceName(n)))
            if n == "TEDPostgres"
    ));
}

#[tokio::test]
async fn test_finalize_waits_for_in_flight_reconnection() {
    // Arrange
    let probe = ScriptedProbe::build(DatasourceType::Postgres, 0, Duration::from_millis(150));
    let h = harness(vec![probe.clone()]).await;
    let bundle = r#"{
        "serverSchemaVersion": 6,
        "exportedApplication": { "name": "single" },
        "datasourceList": [{ "name": "TEDPostgres", "pluginId": "postgres-plugin" }],
        "pageList": [{ "name": "Page1" }]
    }"#;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, bundle.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let orchestrator = h.orchestrator.clone();
    let reconnect = tokio::spawn(async move {
        orchestrator
            .reconnect("ted", draft_id, "TEDPostgres", postgres())
            .await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    let status = h.orchestrator.status("ted", draft_id).await.unwrap();
    let result = h.orchestrator.finalize("ted", draft_id).await;

    // Assert
    assert_eq!(status.reconnections[0].status, ReconnectionStatus::Testing);
    assert!(reconnect.await.unwrap().is_ok());
    let result = result.expect("finalize runs after the in-flight probe settles");
    assert!(result.success);
    assert_eq!(result.unresolved_count, 0);
}

#[tokio::test]
async fn test_cancel_keeps_persisted_datasources() {
    // Arrange
    let h = harness(vec![
        ScriptedProbe::new(DatasourceType::Postgres),
        ScriptedProbe::new(DatasourceType::MySql),
        ScriptedProbe::new(DatasourceType::Mongo),
    ])
    .await;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;
    h.orchestrator
        .reconnect("ted", draft_id, "TEDPostgres", postgres())
        .await
        .unwrap();

    // Act
    let status = h.orchestrator.cancel("ted", draft_id).await.unwrap();
    let finalize = h.orchestrator.finalize("ted", draft_id).await;

    // Assert
    assert_eq!(status.state, ImportState::Aborted);
    assert!(matches!(
        finalize,
        Err(ImportServiceError::Import(ImportError::InvalidState { .. }))
    ));
    assert!(h.store.draft(draft_id).await.is_none());
    assert!(h.store.list_applications(h.workspace_id).await.unwrap().is_empty());
    assert_eq!(h.store.list_datasources(h.workspace_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_reconnects_then_finalize_binds_every_datasource() {
    // Arrange
    let delay = Duration::from_millis(30);
    let h = harness(vec![
        ScriptedProbe::build(DatasourceType::Postgres, 0, delay),
        ScriptedProbe::build(DatasourceType::MySql, 0, delay),
        ScriptedProbe::build(DatasourceType::Mongo, 0, delay),
    ])
    .await;
    let draft_id = h
        .orchestrator
        .start_import("ted", h.workspace_id, TED_BUNDLE.as_bytes(), BundleSource::Json)
        .await
        .unwrap()
        .draft_id;

    // Act
    let reconnects = [
        ("TEDPostgres", postgres()),
        ("TEDMySQL", mysql()),
        ("TEDMongo", mongo()),
    ]
    .into_iter()
    .map(|(name, credentials)| {
        let orchestrator = h.orchestrator.clone();
        async move {
            orchestrator
                .reconnect("ted", draft_id, name, credentials)
                .await
        }
    });
    let outcomes = futures::future::join_all(reconnects).await;
    let result = h.orchestrator.finalize("ted", draft_id).await.unwrap();

    // Assert
    assert!(outcomes.iter().all(Result::is_ok));
    assert!(result.success);
    assert_eq!(result.unresolved_count, 0);
    let applications = h.store.list_applications(h.workspace_id).await.unwrap();
    assert_eq!(applications.len(), 1);
    assert!(applications[0]
        .datasource_bindings
        .values()
        .all(Option::is_some));
}
