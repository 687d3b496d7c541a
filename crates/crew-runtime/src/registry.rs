//! Teammate registry: the live set of teammates, indexed by team and name.
//!
//! The registry exclusively owns teammate records and keeps each team's
//! `config.json` in sync with memory. Cycles are avoided by construction:
//! a teammate record holds `(name, team)` strings and the registry
//! dereferences on demand.

use crate::agent::{self, TeammateSeat};
use crate::context::{RuntimeContext, RuntimePaths};
use crate::error::RuntimeError;
use crate::executor::TaskType;
use crate::protocol::{new_request_id, PendingShutdowns};
use agent_crew_core::io::atomic::atomic_replace_json;
use agent_crew_core::io::inbox::inbox_append;
use agent_crew_core::schema::{MemberEntry, Message, MessageType, TeamConfig, TeammateStatus};
use agent_crew_core::text::sanitize_name;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Display palette, cycled by global spawn order.
pub const TEAMMATE_COLORS: [&str; 6] = ["blue", "green", "yellow", "magenta", "cyan", "red"];

/// Reserved name of the controlling agent in every team.
pub const LEAD_NAME: &str = "team-lead";

/// Shared mutable status: the teammate's own loop and the controller both
/// update it, and clones handed out by [`TeammateRegistry::find`] stay live.
#[derive(Clone)]
pub struct StatusCell(Arc<Mutex<TeammateStatus>>);

impl StatusCell {
    fn new(status: TeammateStatus) -> Self {
        StatusCell(Arc::new(Mutex::new(status)))
    }

    pub fn get(&self) -> TeammateStatus {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, status: TeammateStatus) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// A live worker agent.
#[derive(Clone)]
pub struct Teammate {
    pub name: String,
    pub team: String,
    pub color: String,
    pub inbox_path: PathBuf,
    pub status: StatusCell,
    /// Background executor handle while running.
    pub handle: Option<String>,
}

impl Teammate {
    pub fn agent_id(&self) -> String {
        format!("{}@{}", self.name, self.team)
    }
}

struct TeamEntry {
    name: String,
    lead_agent_id: String,
    created_at: String,
    members: Vec<Teammate>,
}

struct RegistryInner {
    teams: BTreeMap<String, TeamEntry>,
    spawn_count: usize,
}

/// A resolved message destination.
pub struct ResolvedRecipient {
    pub agent_id: String,
    pub inbox_path: PathBuf,
}

/// Owns teammate lifecycle and team-configuration persistence.
pub struct TeammateRegistry {
    paths: RuntimePaths,
    inner: Mutex<RegistryInner>,
}

impl TeammateRegistry {
    pub fn new(paths: RuntimePaths) -> Self {
        TeammateRegistry {
            paths,
            inner: Mutex::new(RegistryInner {
                teams: BTreeMap::new(),
                spawn_count: 0,
            }),
        }
    }

    /// Create a team directory and its `config.json` with no workers yet.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when the team is registered or its directory exists;
    /// `InvalidInput` for unusable names.
    pub fn create_team(&self, name: &str) -> Result<String, RuntimeError> {
        let team = sanitize_name(name).map_err(RuntimeError::InvalidInput)?;
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let team_dir = self.paths.team_dir(&team);
        if guard.teams.contains_key(&team) || team_dir.exists() {
            return Err(RuntimeError::AlreadyExists(team));
        }

        std::fs::create_dir_all(&team_dir).map_err(|e| {
            RuntimeError::Store(agent_crew_core::io::StoreError::Io {
                path: team_dir.clone(),
                source: e,
            })
        })?;

        let entry = TeamEntry {
            name: team.clone(),
            lead_agent_id: format!("{LEAD_NAME}@{team}"),
            created_at: chrono::Utc::now().to_rfc3339(),
            members: Vec::new(),
        };
        self.write_config_entry(&entry)?;
        guard.teams.insert(team.clone(), entry);

        info!("created team '{team}'");
        Ok(format!("Created team '{team}'"))
    }

    /// Register a teammate record: color from the palette, inbox under the
    /// team directory, `config.json` rewritten. Does not start the loop.
    pub(crate) fn register_member(&self, name: &str, team: &str) -> Result<Teammate, RuntimeError> {
        let safe_name = sanitize_name(name).map_err(RuntimeError::InvalidInput)?;
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;

        let Some(entry) = inner.teams.get(team) else {
            return Err(RuntimeError::TeamNotFound(team.to_string()));
        };
        if safe_name == LEAD_NAME || entry.members.iter().any(|m| m.name == safe_name) {
            return Err(RuntimeError::InvalidInput(format!(
                "teammate '{safe_name}' already exists in team '{team}'"
            )));
        }

        let color = TEAMMATE_COLORS[inner.spawn_count % TEAMMATE_COLORS.len()];
        inner.spawn_count += 1;

        let inbox_path = self.paths.inbox_path(team, &safe_name);
        // Touch without truncating so the file exists before first delivery.
        if let Err(e) = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&inbox_path)
        {
            warn!("could not pre-create inbox {}: {e}", inbox_path.display());
        }

        let teammate = Teammate {
            name: safe_name,
            team: team.to_string(),
            color: color.to_string(),
            inbox_path,
            status: StatusCell::new(TeammateStatus::Active),
            handle: None,
        };

        let entry = inner
            .teams
            .get_mut(team)
            .ok_or_else(|| RuntimeError::TeamNotFound(team.to_string()))?;
        entry.members.push(teammate.clone());
        self.write_config_entry(entry)?;
        Ok(teammate)
    }

    /// Spawn a teammate: register the record and start its agent loop on
    /// the background executor.
    ///
    /// # Errors
    ///
    /// `TeamNotFound` for unknown teams, `InvalidInput` for duplicate or
    /// unusable names.
    pub fn spawn(
        &self,
        ctx: &Arc<RuntimeContext>,
        name: &str,
        team: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, RuntimeError> {
        let teammate = self.register_member(name, team)?;

        let seat = TeammateSeat {
            name: teammate.name.clone(),
            team: teammate.team.clone(),
            inbox_path: teammate.inbox_path.clone(),
            status: teammate.status.clone(),
            initial_prompt: prompt.to_string(),
        };
        let loop_ctx = Arc::clone(ctx);
        let handle = ctx.executor.run(
            move |worker| agent::run_teammate_loop(loop_ctx, worker, seat),
            TaskType::Teammate,
        );

        {
            let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(member) = guard
                .teams
                .get_mut(team)
                .and_then(|e| e.members.iter_mut().find(|m| m.name == teammate.name))
            {
                member.handle = Some(handle.clone());
            }
        }

        info!("spawned teammate '{}' in team '{team}' ({handle})", teammate.name);
        Ok(serde_json::json!({
            "name": teammate.name,
            "team": teammate.team,
            "status": "active",
            "handle": handle,
        }))
    }

    /// Tear a team down: inject a `shutdown_request` into every member's
    /// inbox, flip their statuses, and drop the team from the registry.
    /// The team directory (with final inbox state) is retained on disk and
    /// `config.json` is rewritten with zero members. Idempotent.
    pub fn delete_team(
        &self,
        team: &str,
        pending: &PendingShutdowns,
    ) -> Result<String, RuntimeError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = guard.teams.remove(team) else {
            return Ok(format!("Team '{team}' already deleted"));
        };

        let mut notified = 0usize;
        for member in &entry.members {
            let request_id = new_request_id();
            pending.record(&request_id, team, &member.name);

            let request = Message::new(
                MessageType::ShutdownRequest,
                &entry.lead_agent_id,
                &member.name,
                "Team is being deleted. Finish your current work and acknowledge.",
            )
            .with_request_id(request_id);

            // Delivery is best-effort; statuses are flipped regardless.
            match inbox_append(&member.inbox_path, std::slice::from_ref(&request)) {
                Ok(()) => notified += 1,
                Err(e) => warn!(
                    "failed to deliver shutdown_request to {}: {e}",
                    member.agent_id()
                ),
            }
            member.status.set(TeammateStatus::Shutdown);
        }

        let emptied = TeamEntry {
            members: Vec::new(),
            ..entry
        };
        self.write_config_entry(&emptied)?;

        info!("deleted team '{team}' ({notified} teammates notified)");
        Ok(format!(
            "Team '{team}' deleted ({notified} teammates notified)"
        ))
    }

    /// Find a teammate by name; searches all teams when `team` is omitted
    /// and returns the first match.
    pub fn find(&self, name: &str, team: Option<&str>) -> Option<Teammate> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match team {
            Some(team) => guard
                .teams
                .get(team)
                .and_then(|e| e.members.iter().find(|m| m.name == name).cloned()),
            None => guard
                .teams
                .values()
                .find_map(|e| e.members.iter().find(|m| m.name == name).cloned()),
        }
    }

    /// Snapshot of a team's members in spawn order.
    ///
    /// # Errors
    ///
    /// `TeamNotFound` for unknown teams.
    pub fn members(&self, team: &str) -> Result<Vec<Teammate>, RuntimeError> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .teams
            .get(team)
            .map(|e| e.members.clone())
            .ok_or_else(|| RuntimeError::TeamNotFound(team.to_string()))
    }

    pub fn team_names(&self) -> Vec<String> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.teams.keys().cloned().collect()
    }

    /// Resolve a recipient to its agent id and inbox path.
    ///
    /// `recipient` may be a bare name or `name@team`; bare names fall back
    /// to `default_team`, then to a search across all teams. The lead
    /// resolves for any team whose directory still exists, so late protocol
    /// acknowledgements outlive registry entries.
    ///
    /// # Errors
    ///
    /// `RecipientNotFound` when nothing matches.
    pub fn resolve_recipient(
        &self,
        recipient: &str,
        default_team: Option<&str>,
    ) -> Result<ResolvedRecipient, RuntimeError> {
        let (name, team_hint) = match recipient.split_once('@') {
            Some((name, team)) => (name, Some(team)),
            None => (recipient, default_team),
        };

        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(team) = team_hint {
            if name == LEAD_NAME {
                if guard.teams.contains_key(team) || self.paths.team_dir(team).exists() {
                    return Ok(ResolvedRecipient {
                        agent_id: format!("{LEAD_NAME}@{team}"),
                        inbox_path: self.paths.inbox_path(team, LEAD_NAME),
                    });
                }
                return Err(RuntimeError::RecipientNotFound(recipient.to_string()));
            }
            return guard
                .teams
                .get(team)
                .and_then(|e| e.members.iter().find(|m| m.name == name))
                .map(|m| ResolvedRecipient {
                    agent_id: m.agent_id(),
                    inbox_path: m.inbox_path.clone(),
                })
                .ok_or_else(|| RuntimeError::RecipientNotFound(recipient.to_string()));
        }

        for entry in guard.teams.values() {
            if name == LEAD_NAME {
                return Ok(ResolvedRecipient {
                    agent_id: entry.lead_agent_id.clone(),
                    inbox_path: self.paths.inbox_path(&entry.name, LEAD_NAME),
                });
            }
            if let Some(m) = entry.members.iter().find(|m| m.name == name) {
                return Ok(ResolvedRecipient {
                    agent_id: m.agent_id(),
                    inbox_path: m.inbox_path.clone(),
                });
            }
        }
        Err(RuntimeError::RecipientNotFound(recipient.to_string()))
    }

    /// Rewrite a team's `config.json` from the in-memory registry.
    ///
    /// # Errors
    ///
    /// `TeamNotFound` for unknown teams.
    pub fn update_team_config(&self, team: &str) -> Result<(), RuntimeError> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = guard
            .teams
            .get(team)
            .ok_or_else(|| RuntimeError::TeamNotFound(team.to_string()))?;
        self.write_config_entry(entry)
    }

    /// Human-readable snapshot of one team, or of every team.
    ///
    /// # Errors
    ///
    /// `TeamNotFound` when a named team does not exist.
    pub fn get_team_status(&self, team: Option<&str>) -> Result<String, RuntimeError> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<&TeamEntry> = match team {
            Some(name) => vec![guard
                .teams
                .get(name)
                .ok_or_else(|| RuntimeError::TeamNotFound(name.to_string()))?],
            None => guard.teams.values().collect(),
        };

        if entries.is_empty() {
            return Ok("No teams have been created yet.".to_string());
        }

        let mut out = String::new();
        for entry in entries {
            out.push_str(&format!(
                "Team '{}' (lead: {})\n",
                entry.name, entry.lead_agent_id
            ));
            if entry.members.is_empty() {
                out.push_str("  (no teammates)\n");
            }
            for m in &entry.members {
                out.push_str(&format!(
                    "  {:<12} {:<9} {:<8} {}\n",
                    m.name,
                    m.status.get().to_string(),
                    m.color,
                    m.inbox_path
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ));
            }
        }
        Ok(out)
    }

    fn write_config_entry(&self, entry: &TeamEntry) -> Result<(), RuntimeError> {
        let mut members = Vec::with_capacity(entry.members.len() + 1);
        members.push(MemberEntry {
            name: LEAD_NAME.to_string(),
            agent_id: entry.lead_agent_id.clone(),
            status: TeammateStatus::Active,
            color: None,
            inbox_path: self
                .paths
                .inbox_path(&entry.name, LEAD_NAME)
                .display()
                .to_string(),
            unknown_fields: HashMap::new(),
        });
        for m in &entry.members {
            members.push(MemberEntry {
                name: m.name.clone(),
                agent_id: m.agent_id(),
                status: m.status.get(),
                color: Some(m.color.clone()),
                inbox_path: m.inbox_path.display().to_string(),
                unknown_fields: HashMap::new(),
            });
        }

        let config = TeamConfig {
            name: entry.name.clone(),
            lead_agent_id: entry.lead_agent_id.clone(),
            created_at: entry.created_at.clone(),
            members,
            unknown_fields: HashMap::new(),
        };
        atomic_replace_json(&self.paths.team_config_path(&entry.name), &config)?;
        debug!("rewrote config for team '{}'", entry.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> TeammateRegistry {
        let paths = RuntimePaths::new(dir.path());
        std::fs::create_dir_all(paths.teams_dir()).unwrap();
        TeammateRegistry::new(paths)
    }

    #[test]
    fn create_team_writes_config() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        let out = registry.create_team("t1").unwrap();
        assert!(out.contains("t1"));

        let config_path = registry.paths.team_config_path("t1");
        let raw = std::fs::read_to_string(config_path).unwrap();
        let config: TeamConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(config.name, "t1");
        assert_eq!(config.lead_agent_id, "team-lead@t1");
        assert_eq!(config.members.len(), 1);
        assert_eq!(config.members[0].name, "team-lead");
    }

    #[test]
    fn create_team_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("dup").unwrap();
        assert!(matches!(
            registry.create_team("dup"),
            Err(RuntimeError::AlreadyExists(_))
        ));
    }

    #[test]
    fn register_member_requires_team() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        assert!(matches!(
            registry.register_member("alice", "ghost"),
            Err(RuntimeError::TeamNotFound(_))
        ));
    }

    #[test]
    fn register_member_rejects_duplicates_and_lead_name() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("t1").unwrap();
        registry.register_member("alice", "t1").unwrap();

        assert!(matches!(
            registry.register_member("alice", "t1"),
            Err(RuntimeError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.register_member("team-lead", "t1"),
            Err(RuntimeError::InvalidInput(_))
        ));
    }

    #[test]
    fn colors_cycle_in_spawn_order_across_teams() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("a").unwrap();
        registry.create_team("b").unwrap();

        let n = TEAMMATE_COLORS.len() + 2;
        let mut colors = Vec::new();
        for i in 0..n {
            let team = if i % 2 == 0 { "a" } else { "b" };
            let m = registry.register_member(&format!("w{i}"), team).unwrap();
            colors.push(m.color);
        }
        for (i, color) in colors.iter().enumerate() {
            assert_eq!(color, TEAMMATE_COLORS[i % TEAMMATE_COLORS.len()]);
        }
    }

    #[test]
    fn agent_ids_are_unique_across_live_teammates() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("a").unwrap();
        registry.create_team("b").unwrap();

        let m1 = registry.register_member("alice", "a").unwrap();
        let m2 = registry.register_member("alice", "b").unwrap();
        let m3 = registry.register_member("bob", "a").unwrap();

        let ids = [m1.agent_id(), m2.agent_id(), m3.agent_id()];
        let mut deduped = ids.to_vec();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn find_scoped_and_unscoped() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("t1").unwrap();
        registry.register_member("alice", "t1").unwrap();

        assert!(registry.find("alice", Some("t1")).is_some());
        assert!(registry.find("alice", None).is_some());
        assert!(registry.find("alice", Some("t2")).is_none());
        assert!(registry.find("ghost", None).is_none());
    }

    #[test]
    fn resolve_recipient_forms() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("t1").unwrap();
        registry.register_member("alice", "t1").unwrap();

        let direct = registry.resolve_recipient("alice", Some("t1")).unwrap();
        assert_eq!(direct.agent_id, "alice@t1");

        let qualified = registry.resolve_recipient("alice@t1", None).unwrap();
        assert_eq!(qualified.agent_id, "alice@t1");

        let lead = registry.resolve_recipient("team-lead@t1", None).unwrap();
        assert_eq!(lead.agent_id, "team-lead@t1");
        assert!(lead
            .inbox_path
            .to_string_lossy()
            .ends_with("inbox.team-lead.jsonl"));

        assert!(matches!(
            registry.resolve_recipient("ghost", Some("t1")),
            Err(RuntimeError::RecipientNotFound(_))
        ));
        assert!(matches!(
            registry.resolve_recipient("team-lead@nowhere", None),
            Err(RuntimeError::RecipientNotFound(_))
        ));
    }

    #[test]
    fn lead_resolves_after_team_deletion() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let pending = PendingShutdowns::default();
        registry.create_team("t1").unwrap();
        registry.register_member("alice", "t1").unwrap();
        registry.delete_team("t1", &pending).unwrap();

        // The directory is retained, so late shutdown_responses still land.
        let lead = registry.resolve_recipient("team-lead@t1", None).unwrap();
        assert_eq!(lead.agent_id, "team-lead@t1");
    }

    #[test]
    fn delete_team_flips_statuses_and_injects_requests() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let pending = PendingShutdowns::default();
        registry.create_team("t1").unwrap();
        let alpha = registry.register_member("alpha", "t1").unwrap();
        let beta = registry.register_member("beta", "t1").unwrap();

        let out = registry.delete_team("t1", &pending).unwrap();
        assert!(out.contains("deleted"));

        assert_eq!(alpha.status.get(), TeammateStatus::Shutdown);
        assert_eq!(beta.status.get(), TeammateStatus::Shutdown);
        assert_eq!(pending.len(), 2);

        for member in [&alpha, &beta] {
            let raw = std::fs::read_to_string(&member.inbox_path).unwrap();
            let line = raw.lines().next().unwrap();
            let msg: Message = serde_json::from_str(line).unwrap();
            assert_eq!(msg.kind, MessageType::ShutdownRequest);
            assert!(msg.request_id.is_some());
            assert_eq!(msg.sender, "team-lead@t1");
        }

        // Registry entry is gone; config reflects zero members.
        assert!(registry.find("alpha", Some("t1")).is_none());
        let raw = std::fs::read_to_string(registry.paths.team_config_path("t1")).unwrap();
        let config: TeamConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(config.members.len(), 1); // lead only
        assert_eq!(config.members[0].name, "team-lead");

        // Idempotent.
        let again = registry.delete_team("t1", &pending).unwrap();
        assert!(again.contains("deleted"));
    }

    #[test]
    fn team_status_snapshot() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        assert!(registry
            .get_team_status(None)
            .unwrap()
            .contains("No teams"));

        registry.create_team("t1").unwrap();
        registry.register_member("alice", "t1").unwrap();
        let status = registry.get_team_status(Some("t1")).unwrap();
        assert!(status.contains("Team 't1'"));
        assert!(status.contains("alice"));
        assert!(status.contains("active"));

        assert!(matches!(
            registry.get_team_status(Some("nope")),
            Err(RuntimeError::TeamNotFound(_))
        ));
    }

    #[test]
    fn update_team_config_reflects_status_changes() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.create_team("t1").unwrap();
        let alice = registry.register_member("alice", "t1").unwrap();

        alice.status.set(TeammateStatus::Idle);
        registry.update_team_config("t1").unwrap();

        let raw = std::fs::read_to_string(registry.paths.team_config_path("t1")).unwrap();
        let config: TeamConfig = serde_json::from_str(&raw).unwrap();
        let member = config.members.iter().find(|m| m.name == "alice").unwrap();
        assert_eq!(member.status, TeammateStatus::Idle);
        assert_eq!(member.color.as_deref(), Some(TEAMMATE_COLORS[0]));
    }
}
