//! In-memory directory and host used by the provisioning integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ldapbox_core::Error;
use ldapbox_directory::{
    AccountStore, Backends, CacheDatabase, Directory, DirectoryConfig, DirectoryModification,
    DistinguishedName, Host, LdapEntry, NewEntry, Preseed, Provisioner, Result, SearchScope,
};
use secrecy::{ExposeSecret, SecretString};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// DN of the admin database the fake `cn=config` holds.
pub const ADMIN_DATABASE_DN: &str = "olcDatabase={1}mdb,cn=config";

#[derive(Debug, Default)]
struct State {
    entries: BTreeSet<String>,
    users: BTreeMap<String, User>,
    groups: BTreeMap<String, BTreeSet<String>>,
    root_dn: String,
    root_password: Option<String>,
    writes: Vec<String>,
}

#[derive(Debug, Clone)]
struct User {
    uid: u32,
    password_hash: Option<String>,
}

fn failed(program: &str, code: i32, stderr: &str) -> Error {
    Error::CommandFailed {
        program: program.to_string(),
        code: Some(code),
        stderr: stderr.to_string(),
    }
}

/// Directory and account store kept in memory.
///
/// Like the real helpers, renaming or deleting a user does not touch group memberships.
#[derive(Debug, Clone)]
pub struct FakeDirectory {
    state: Arc<Mutex<State>>,
    primary_group: String,
}

impl FakeDirectory {
    /// Fresh directory with a password-protected admin and no organizational units.
    pub fn new() -> Self {
        let state = State {
            root_dn: "cn=admin,dc=thisbox".to_string(),
            root_password: Some("{SSHA}adminsecret".to_string()),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            primary_group: "users".to_string(),
        }
    }

    pub fn with_user(self, user: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let uid = 10_001 + u32::try_from(state.users.len()).unwrap();
            state.users.insert(
                user.to_string(),
                User {
                    uid,
                    password_hash: None,
                },
            );
        }
        self
    }

    pub fn with_membership(self, user: &str, group: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(user.to_string());
        self
    }

    pub fn with_group(self, group: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .groups
            .entry(group.to_string())
            .or_default();
        self
    }

    pub fn user_exists(&self, user: &str) -> bool {
        self.state.lock().unwrap().users.contains_key(user)
    }

    pub fn group_names(&self) -> Vec<String> {
        self.state.lock().unwrap().groups.keys().cloned().collect()
    }

    pub fn members(&self, group: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn password_hash(&self, user: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(user)
            .and_then(|u| u.password_hash.clone())
    }

    pub fn entries(&self) -> Vec<String> {
        self.state.lock().unwrap().entries.iter().cloned().collect()
    }

    pub fn root_dn(&self) -> String {
        self.state.lock().unwrap().root_dn.clone()
    }

    pub fn root_password(&self) -> Option<String> {
        self.state.lock().unwrap().root_password.clone()
    }

    /// Every mutating call in order, e.g. `add-group web`.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    fn record(state: &mut State, write: String) {
        state.writes.push(write);
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn entry_exists(&self, dn: &DistinguishedName) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .entries
            .contains(&dn.as_str().to_ascii_lowercase()))
    }

    async fn search(
        &self,
        base: &DistinguishedName,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        assert_eq!(base.as_str(), "cn=config");
        assert_eq!(scope, SearchScope::OneLevel);
        if filter != "(olcSuffix=dc=thisbox)" {
            return Ok(Vec::new());
        }

        let state = self.state.lock().unwrap();
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for attribute in attributes {
            let value = match attribute.to_ascii_lowercase().as_str() {
                "olcrootdn" => Some(state.root_dn.clone()),
                "olcrootpw" => state.root_password.clone(),
                _ => None,
            };
            if let Some(value) = value {
                values.insert(attribute.to_ascii_lowercase(), vec![value]);
            }
        }
        Ok(vec![LdapEntry {
            dn: ADMIN_DATABASE_DN.to_string(),
            attributes: values,
        }])
    }

    async fn add_entry(&self, entry: &NewEntry) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = entry.dn.as_str().to_ascii_lowercase();
        if !state.entries.insert(key) {
            return Err(failed("ldapadd", 68, "Already exists (68)"));
        }
        Self::record(&mut state, format!("add-entry {}", entry.dn));
        Ok(())
    }

    async fn modify(&self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        assert_eq!(dn, ADMIN_DATABASE_DN);
        let mut state = self.state.lock().unwrap();
        for modification in modifications {
            match modification {
                DirectoryModification::Delete { attribute, .. } if attribute == "olcRootPW" => {
                    if state.root_password.take().is_none() {
                        return Err(failed("ldapmodify", 16, "No such attribute (16)"));
                    }
                    Self::record(&mut state, "delete olcRootPW".to_string());
                }
                DirectoryModification::Replace { attribute, values } if attribute == "olcRootDN" => {
                    state.root_dn = values.first().cloned().unwrap_or_default();
                    Self::record(&mut state, "replace olcRootDN".to_string());
                }
                other => panic!("unexpected modification {other:?}"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for FakeDirectory {
    async fn add_user(&self, user: &str, primary_group: &str) -> Result<()> {
        assert_eq!(primary_group, self.primary_group);
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(user) {
            return Err(failed("ldapadduser", 1, "user already exists"));
        }
        let uid = 10_001 + u32::try_from(state.users.len()).unwrap();
        state.users.insert(
            user.to_string(),
            User {
                uid,
                password_hash: None,
            },
        );
        Self::record(&mut state, format!("add-user {user}"));
        Ok(())
    }

    async fn delete_user(&self, user: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.users.remove(user).is_none() {
            return Err(failed("ldapdeleteuser", 1, "no such user"));
        }
        Self::record(&mut state, format!("delete-user {user}"));
        Ok(())
    }

    async fn rename_user(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.users.remove(from) else {
            return Err(failed("ldaprenameuser", 1, "no such user"));
        };
        state.users.insert(to.to_string(), entry);
        Self::record(&mut state, format!("rename-user {from} {to}"));
        Ok(())
    }

    async fn hash_password(&self, password: &SecretString) -> Result<SecretString> {
        let mut hasher = DefaultHasher::new();
        password.expose_secret().hash(&mut hasher);
        Ok(SecretString::from(format!("{{SSHA}}{:016x}", hasher.finish())))
    }

    async fn set_password_hash(&self, user: &str, hash: &SecretString) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.users.get_mut(user) else {
            return Err(failed("ldapmodify", 32, "no such object"));
        };
        entry.password_hash = Some(hash.expose_secret().to_string());
        Self::record(&mut state, format!("set-password {user}"));
        Ok(())
    }

    async fn group_exists(&self, group: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().groups.contains_key(group))
    }

    async fn add_group(&self, group: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.groups.contains_key(group) {
            return Err(failed("ldapaddgroup", 1, "group already exists"));
        }
        state.groups.insert(group.to_string(), BTreeSet::new());
        Self::record(&mut state, format!("add-group {group}"));
        Ok(())
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.groups.remove(group).is_none() {
            return Err(failed("ldapdeletegroup", 1, "no such group"));
        }
        Self::record(&mut state, format!("delete-group {group}"));
        Ok(())
    }

    async fn add_member(&self, user: &str, group: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(members) = state.groups.get_mut(group) else {
            return Err(failed("ldapaddusertogroup", 1, "no such group"));
        };
        if !members.insert(user.to_string()) {
            return Err(failed("ldapaddusertogroup", 20, "Type or value exists (20)"));
        }
        Self::record(&mut state, format!("add-member {user} {group}"));
        Ok(())
    }

    async fn remove_member(&self, user: &str, group: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let removed = state
            .groups
            .get_mut(group)
            .is_some_and(|members| members.remove(user));
        if !removed {
            return Err(failed("ldapdeleteuserfromgroup", 16, "No such attribute (16)"));
        }
        Self::record(&mut state, format!("remove-member {user} {group}"));
        Ok(())
    }

    async fn identity(&self, user: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        let Some(entry) = state.users.get(user) else {
            return Ok(None);
        };
        let mut groups = vec![format!("10000({})", self.primary_group)];
        groups.extend(
            state
                .groups
                .iter()
                .enumerate()
                .filter(|(_, (_, members))| members.contains(user))
                .map(|(index, (name, _))| format!("{}({name})", 10_100 + index)),
        );
        Ok(Some(format!(
            "uid={}({user}) gid=10000({}) groups={}\n",
            entry.uid,
            self.primary_group,
            groups.join(",")
        )))
    }
}

/// Host that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    calls: Arc<Mutex<Vec<String>>>,
    running: Arc<Mutex<BTreeSet<String>>>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn invalidations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("invalidate "))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn register_pam_profile(&self, profile: &str) -> Result<()> {
        self.record(format!("pam {profile}"));
        Ok(())
    }

    async fn preseed(&self, answers: &[Preseed]) -> Result<()> {
        for answer in answers {
            self.record(format!("preseed {}", answer.to_line()));
        }
        Ok(())
    }

    async fn reconfigure_package(&self, package: &str) -> Result<()> {
        self.record(format!("reconfigure {package}"));
        Ok(())
    }

    async fn service_running(&self, service: &str) -> Result<bool> {
        Ok(self.running.lock().unwrap().contains(service))
    }

    async fn start_service(&self, service: &str) -> Result<()> {
        self.running.lock().unwrap().insert(service.to_string());
        self.record(format!("start {service}"));
        Ok(())
    }

    async fn restart_service(&self, service: &str) -> Result<()> {
        self.record(format!("restart {service}"));
        Ok(())
    }

    async fn invalidate_cache(&self, database: CacheDatabase) -> Result<()> {
        self.record(format!("invalidate {}", database.as_str()));
        Ok(())
    }
}

/// A provisioner wired to the fakes, writing the helper configuration to `scripts_config`.
pub fn provisioner(
    directory: &FakeDirectory,
    host: &RecordingHost,
    scripts_config: &std::path::Path,
) -> Provisioner {
    let config = DirectoryConfig::default().with_scripts_config_path(scripts_config);
    Provisioner::new(
        Arc::new(config),
        Backends {
            directory: Arc::new(directory.clone()),
            accounts: Arc::new(directory.clone()),
            host: Arc::new(host.clone()),
        },
    )
}
