use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cern_egroup::directory::{
    Directory, DirectoryEntry, DirectoryError, InMemoryDirectory, SearchRequest,
};
use cern_egroup::egroup::{DirectoryLayout, GroupResolver, ResolveError, ResolveOptions};
use cern_egroup::{Config, EgroupQuery, EgroupService};

/// Helper to build a directory with a small department tree
fn department_directory() -> (DirectoryLayout, InMemoryDirectory) {
    let layout = DirectoryLayout::default();
    let directory = InMemoryDirectory::new()
        .with_group(
            &layout,
            "it-dep",
            [
                layout.user_dn("alice"),
                layout.group_dn("it-dep-cd"),
                layout.group_dn("it-dep-cm"),
                "CN=printer-31,OU=Devices,DC=cern,DC=ch".to_string(),
            ],
        )
        .with_group(
            &layout,
            "it-dep-cd",
            [layout.user_dn("bob"), layout.group_dn("it-dep")],
        )
        .with_group(&layout, "it-dep-cm", [layout.user_dn("carol")])
        .with_user(&layout, "alice", ["alice@cern.ch"])
        .with_user(&layout, "bob", ["bob@cern.ch"])
        .with_user(&layout, "carol", Vec::<String>::new());
    (layout, directory)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn multiset(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

#[tokio::test]
async fn test_transitive_closure_with_cycle() {
    let (layout, directory) = department_directory();
    let directory = Arc::new(directory);
    let resolver =
        GroupResolver::new(directory.clone(), layout, ResolveOptions::default()).unwrap();

    let resolution = resolver.resolve(&strings(&["it-dep"])).await.unwrap();

    assert_eq!(
        multiset(resolution.users),
        strings(&["alice", "bob", "carol"])
    );
    assert_eq!(
        resolution.visited,
        ["it-dep", "it-dep-cd", "it-dep-cm"]
            .iter()
            .map(|g| g.to_string())
            .collect::<BTreeSet<_>>()
    );
    // Each group is searched exactly once even though it-dep is reachable twice
    assert_eq!(directory.search_count(), 3);
}

#[tokio::test]
async fn test_multiple_start_groups_share_visited_set() {
    let (layout, directory) = department_directory();
    let directory = Arc::new(directory);
    let resolver =
        GroupResolver::new(directory.clone(), layout, ResolveOptions::default()).unwrap();

    let resolution = resolver
        .resolve(&strings(&["it-dep-cm", "it-dep"]))
        .await
        .unwrap();

    assert_eq!(
        multiset(resolution.users),
        strings(&["alice", "bob", "carol"])
    );
    assert_eq!(directory.searches_for("it-dep-cm"), 1);
}

#[tokio::test]
async fn test_unknown_group_is_not_found() {
    let (layout, directory) = department_directory();
    let resolver =
        GroupResolver::new(Arc::new(directory), layout, ResolveOptions::default()).unwrap();

    let err = resolver.resolve(&strings(&["no-such-group"])).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_service_report_with_missing_mail() {
    let (_, directory) = department_directory();
    let service = EgroupService::with_directory(Config::default(), Arc::new(directory)).unwrap();

    let err = service
        .query(&EgroupQuery {
            groups: strings(&["it-dep"]),
            query_mails: true,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ResolveError::MissingAttribute {
            name: "carol".to_string(),
            attribute: "mail".to_string()
        }
    );
}

#[tokio::test]
async fn test_service_mails() {
    let (_, directory) = department_directory();
    let service = EgroupService::with_directory(Config::default(), Arc::new(directory)).unwrap();

    let mails = service.mails(&strings(&["bob", "alice"])).await.unwrap();
    assert_eq!(mails, strings(&["bob@cern.ch", "alice@cern.ch"]));
}

#[tokio::test]
async fn test_snapshot_file_round_trip_through_service() {
    let snapshot = r#"{
        "entries": [
            {
                "dn": "CN=ops,OU=e-groups,OU=Workgroups,DC=cern,DC=ch",
                "attributes": {
                    "cn": ["ops"],
                    "objectClass": ["top", "group"],
                    "member": [
                        "CN=dave,OU=Users,OU=Organic Units,DC=cern,DC=ch",
                        "CN=ops-night,OU=e-groups,OU=Workgroups,DC=cern,DC=ch"
                    ]
                }
            },
            {
                "dn": "CN=ops-night,OU=e-groups,OU=Workgroups,DC=cern,DC=ch",
                "attributes": {
                    "cn": ["ops-night"],
                    "objectClass": ["top", "group"],
                    "member": ["CN=dave,OU=Users,OU=Organic Units,DC=cern,DC=ch"]
                }
            },
            {
                "dn": "CN=dave,OU=Users,OU=Organic Units,DC=cern,DC=ch",
                "attributes": {
                    "cn": ["dave"],
                    "mail": ["dave@cern.ch"]
                }
            }
        ]
    }"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(snapshot.as_bytes()).unwrap();

    let directory = InMemoryDirectory::from_json_file(file.path()).unwrap();
    let service = EgroupService::with_directory(Config::default(), Arc::new(directory)).unwrap();

    let report = service
        .query(&EgroupQuery {
            groups: strings(&["ops"]),
            query_mails: true,
        })
        .await
        .unwrap();

    // dave is reachable directly and through ops-night
    assert_eq!(report.members, strings(&["dave", "dave"]));
    assert_eq!(report.mails, strings(&["dave@cern.ch", "dave@cern.ch"]));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["groups"][0], "ops");
    assert_eq!(json["visited"].as_array().unwrap().len(), 2);
}

/// Directory that refuses every request, as an unreachable server would
struct UnreachableDirectory;

#[async_trait]
impl Directory for UnreachableDirectory {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        Err(DirectoryError::Connection("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_connection_failure_is_typed() {
    let resolver = GroupResolver::new(
        Arc::new(UnreachableDirectory),
        DirectoryLayout::default(),
        ResolveOptions::default(),
    )
    .unwrap();

    let err = resolver.resolve(&strings(&["it-dep"])).await.unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn test_resolution_completes_within_caller_deadline() {
    let (layout, directory) = department_directory();
    let resolver =
        GroupResolver::new(Arc::new(directory), layout, ResolveOptions::default()).unwrap();

    let groups = strings(&["it-dep"]);
    let result = tokio::time::timeout(Duration::from_secs(5), resolver.resolve(&groups)).await;
    assert!(result.is_ok());
}
