//! End-to-end provisioning behaviour against an in-memory directory.

mod common;

use common::{provisioner, FakeDirectory, RecordingHost};
use ldapbox_core::Error;
use ldapbox_directory::{password_from_input, Operation, Step, PEER_CREDENTIAL_PRINCIPAL};
use tempfile::TempDir;

fn user(name: &str) -> String {
    name.to_string()
}

struct Fixture {
    directory: FakeDirectory,
    host: RecordingHost,
    scripts: TempDir,
}

impl Fixture {
    fn new(directory: FakeDirectory) -> Self {
        Self {
            directory,
            host: RecordingHost::default(),
            scripts: tempfile::tempdir().unwrap(),
        }
    }

    async fn run(&self, operation: Operation) -> ldapbox_directory::Result<Vec<String>> {
        let path = self.scripts.path().join("ldapscripts.conf");
        let outcome = provisioner(&self.directory, &self.host, &path)
            .execute(&operation, None)
            .await?;
        Ok(outcome.groups.unwrap_or_default())
    }

    async fn groups_of(&self, name: &str) -> Vec<String> {
        self.run(Operation::GetUserGroups { user: user(name) })
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn create_group_twice_creates_once() {
    let fixture = Fixture::new(FakeDirectory::new());

    fixture
        .run(Operation::CreateGroup { group: user("web") })
        .await
        .unwrap();
    fixture
        .run(Operation::CreateGroup { group: user("web") })
        .await
        .unwrap();

    assert_eq!(fixture.directory.group_names(), ["web"]);
    assert_eq!(
        fixture
            .directory
            .writes()
            .iter()
            .filter(|w| w.starts_with("add-group"))
            .count(),
        1
    );
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let fixture = Fixture::new(FakeDirectory::new());
    let path = fixture.scripts.path().join("ldapscripts.conf");

    let first = provisioner(&fixture.directory, &fixture.host, &path)
        .execute(&Operation::Setup, None)
        .await
        .unwrap();
    assert_eq!(first.directory_was_running, Some(false));
    assert_eq!(first.scripts_config_changed, Some(true));
    let admin = first.admin_changes.unwrap();
    assert!(admin.removed_root_password && admin.replaced_root_dn);

    let writes_after_first = fixture.directory.writes();
    let config_after_first = std::fs::read_to_string(&path).unwrap();

    let second = provisioner(&fixture.directory, &fixture.host, &path)
        .execute(&Operation::Setup, None)
        .await
        .unwrap();
    assert_eq!(second.directory_was_running, Some(true));
    assert_eq!(second.scripts_config_changed, Some(false));
    assert!(second.admin_changes.unwrap().is_unchanged());

    assert_eq!(fixture.directory.writes(), writes_after_first);
    assert_eq!(
        fixture.directory.entries(),
        ["ou=groups,dc=thisbox", "ou=users,dc=thisbox"]
    );
    assert_eq!(fixture.directory.root_dn(), PEER_CREDENTIAL_PRINCIPAL);
    assert_eq!(fixture.directory.root_password(), None);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), config_after_first);
    assert!(config_after_first.contains("SASLAUTH=\"EXTERNAL\""));
}

#[tokio::test]
async fn bootstrap_steps_run_in_order() {
    let fixture = Fixture::new(FakeDirectory::new());
    fixture.run(Operation::Setup).await.unwrap();

    let calls = fixture.host.calls();
    let position = |prefix: &str| {
        calls
            .iter()
            .position(|call| call.starts_with(prefix))
            .unwrap_or_else(|| panic!("missing host call `{prefix}` in {calls:?}"))
    };
    assert!(position("pam ldap") < position("preseed slapd slapd/domain string thisbox"));
    assert!(position("reconfigure slapd") < position("preseed nslcd"));
    assert!(position("reconfigure nslcd") < position("restart nscd"));
    assert!(position("restart nscd") < position("start slapd"));
    assert!(fixture.host.invalidations().is_empty());
}

#[tokio::test]
async fn rename_preserves_membership() {
    let fixture = Fixture::new(
        FakeDirectory::new()
            .with_user("old")
            .with_membership("old", "g1")
            .with_membership("old", "g2"),
    );

    fixture
        .run(Operation::RenameUser {
            from: user("old"),
            to: user("new"),
        })
        .await
        .unwrap();

    assert_eq!(fixture.groups_of("new").await, ["g1", "g2"]);
    assert!(!fixture.directory.user_exists("old"));
    assert_eq!(fixture.directory.members("g1"), ["new"]);
    assert_eq!(fixture.directory.members("g2"), ["new"]);
}

#[tokio::test]
async fn remove_user_cleans_memberships_first() {
    let fixture = Fixture::new(
        FakeDirectory::new()
            .with_user("bob")
            .with_user("alice")
            .with_membership("bob", "g1")
            .with_membership("bob", "g2")
            .with_membership("alice", "g2"),
    );

    fixture
        .run(Operation::RemoveUser { user: user("bob") })
        .await
        .unwrap();

    assert!(!fixture.directory.user_exists("bob"));
    assert!(fixture.directory.members("g1").is_empty());
    assert_eq!(fixture.directory.members("g2"), ["alice"]);
    assert_eq!(
        fixture.directory.writes().last().map(String::as_str),
        Some("delete-user bob")
    );
}

#[tokio::test]
async fn primary_group_is_never_reported() {
    let fixture = Fixture::new(
        FakeDirectory::new()
            .with_user("bob")
            .with_membership("bob", "users")
            .with_membership("bob", "admins"),
    );

    assert_eq!(fixture.groups_of("bob").await, ["admins"]);
}

#[tokio::test]
async fn add_user_to_group_creates_missing_group() {
    let fixture = Fixture::new(FakeDirectory::new().with_user("alice"));

    fixture
        .run(Operation::AddUserToGroup {
            user: user("alice"),
            group: user("newgroup"),
        })
        .await
        .unwrap();

    assert_eq!(fixture.directory.group_names(), ["newgroup"]);
    assert_eq!(fixture.directory.members("newgroup"), ["alice"]);
}

#[tokio::test]
async fn every_mutation_flushes_both_caches() {
    let fixture = Fixture::new(FakeDirectory::new().with_user("old").with_user("carol"));
    let password = password_from_input("S3cret!\n").unwrap();
    let path = fixture.scripts.path().join("ldapscripts.conf");
    let provisioner = provisioner(&fixture.directory, &fixture.host, &path);

    let operations = [
        Operation::CreateUser { user: user("bob") },
        Operation::CreateGroup { group: user("g") },
        Operation::AddUserToGroup {
            user: user("bob"),
            group: user("g"),
        },
        Operation::RemoveUserFromGroup {
            user: user("bob"),
            group: user("g"),
        },
        Operation::RenameUser {
            from: user("old"),
            to: user("new"),
        },
        Operation::RemoveUser { user: user("carol") },
        Operation::RemoveGroup { group: user("g") },
    ];
    for operation in &operations {
        fixture.host.clear();
        provisioner
            .execute(operation, Some(&password))
            .await
            .unwrap_or_else(|err| panic!("{operation:?} failed: {err}"));
        assert_eq!(
            fixture.host.invalidations(),
            ["invalidate passwd", "invalidate group"],
            "{operation:?}"
        );
    }
}

#[tokio::test]
async fn created_user_stores_a_hash() {
    let fixture = Fixture::new(FakeDirectory::new());
    let path = fixture.scripts.path().join("ldapscripts.conf");
    let password = password_from_input("S3cret!\n").unwrap();

    let outcome = provisioner(&fixture.directory, &fixture.host, &path)
        .execute(&Operation::CreateUser { user: user("bob") }, Some(&password))
        .await
        .unwrap();

    assert!(fixture.directory.user_exists("bob"));
    let stored = fixture.directory.password_hash("bob").unwrap();
    assert!(stored.starts_with("{SSHA}"));
    assert!(!stored.contains("S3cret!"));
    assert_eq!(
        outcome.completed,
        [
            Step::AddUser {
                user: user("bob"),
                primary_group: user("users"),
            },
            Step::SetPassword { user: user("bob") },
            Step::FlushCache,
        ]
    );
}

#[tokio::test]
async fn unknown_user_has_no_groups() {
    let fixture = Fixture::new(FakeDirectory::new());
    assert!(fixture.groups_of("ghost").await.is_empty());
}

#[tokio::test]
async fn recreating_a_user_fails_with_tool_status() {
    let fixture = Fixture::new(FakeDirectory::new().with_user("bob"));
    let path = fixture.scripts.path().join("ldapscripts.conf");
    let password = password_from_input("pw").unwrap();

    let err = provisioner(&fixture.directory, &fixture.host, &path)
        .execute(&Operation::CreateUser { user: user("bob") }, Some(&password))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CommandFailed { .. }));
    assert!(fixture.host.invalidations().is_empty());
}

#[tokio::test]
async fn remove_group_twice_is_a_no_op() {
    let fixture = Fixture::new(FakeDirectory::new().with_group("web"));

    fixture
        .run(Operation::RemoveGroup { group: user("web") })
        .await
        .unwrap();
    fixture
        .run(Operation::RemoveGroup { group: user("web") })
        .await
        .unwrap();

    assert!(fixture.directory.group_names().is_empty());
    assert_eq!(fixture.host.invalidations().len(), 4);
}

#[tokio::test]
async fn invalid_names_touch_nothing() {
    let fixture = Fixture::new(FakeDirectory::new());

    let err = fixture
        .run(Operation::CreateGroup {
            group: user("--all"),
        })
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(fixture.directory.writes().is_empty());
    assert!(fixture.host.calls().is_empty());
}
