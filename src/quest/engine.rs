//! The engine façade.
//!
//! Everything at runtime flows through [`QuestEngine`]: condition
//! evaluation (negation, cross-package references, cycle breaking), the
//! event firing pipeline (static/persistent gates, firing conditions),
//! objective lifecycle (start, duplicate suppression, completion, persist),
//! and conversation sessions. Composite conditions and folder events
//! re-enter the façade rather than calling each other directly, which keeps
//! negation and qualification uniform at every depth.
//!
//! Evaluation failures fail closed: an unknown reference, an offline
//! player, or a circular reference all evaluate to false (for conditions)
//! or a logged no-op (for events), and negation is not applied to such
//! failures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::logutil::escape_log;
use crate::quest::adapter::GameServer;
use crate::quest::conditions::Condition;
use crate::quest::conversation::{Conversation, ConversationSession, ConversationTurn};
use crate::quest::errors::QuestError;
use crate::quest::events::QuestEvent;
use crate::quest::instruction::Instruction;
use crate::quest::objectives::{Happening, Objective, Progress};
use crate::quest::package::PackageRegistry;
use crate::quest::registry::TypeRegistry;
use crate::quest::storage::QuestStore;
use crate::quest::types::{PlayerRecord, StoredObjective};

/// Live state for one joined player. Objectives exist as parsed instances
/// only while the player is active; they are re-encoded to instruction
/// strings on save.
struct ActivePlayer {
    record: PlayerRecord,
    objectives: Vec<Box<dyn Objective>>,
    /// Stored objectives that failed to re-parse on join. Kept verbatim so
    /// a typo'd or not-yet-registered type does not destroy progress.
    parked: Vec<StoredObjective>,
}

pub struct QuestEngine {
    server: Box<dyn GameServer>,
    registry: TypeRegistry,
    packs: PackageRegistry,
    conditions: HashMap<String, Arc<dyn Condition>>,
    events: HashMap<String, Arc<dyn QuestEvent>>,
    players: HashMap<String, ActivePlayer>,
    sessions: HashMap<String, ConversationSession>,
    store: QuestStore,
    eval_stack: RefCell<Vec<String>>,
}

impl QuestEngine {
    pub fn new(server: Box<dyn GameServer>, store: QuestStore) -> Self {
        Self {
            server,
            registry: TypeRegistry::with_builtins(),
            packs: PackageRegistry::new(),
            conditions: HashMap::new(),
            events: HashMap::new(),
            players: HashMap::new(),
            sessions: HashMap::new(),
            store,
            eval_stack: RefCell::new(Vec::new()),
        }
    }

    pub fn server(&self) -> &dyn GameServer {
        self.server.as_ref()
    }

    pub fn store(&self) -> &QuestStore {
        &self.store
    }

    /// For collaborator shims that register extra instruction types at boot.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Load packages from disk and swap them in. The new set is fully built
    /// before the old one is replaced, so a failed load leaves the running
    /// definitions untouched.
    pub fn load_packs(&mut self, root: &Path) -> Result<(), QuestError> {
        let packs = PackageRegistry::load_dir(root)?;
        self.install_packs(packs);
        Ok(())
    }

    /// Swap in an already-loaded package set, compiling every condition and
    /// event definition. A definition that fails to parse is reported and
    /// skipped; the rest of its package stays live. Active conversation
    /// sessions are ended because their graphs may no longer exist.
    pub fn install_packs(&mut self, packs: PackageRegistry) {
        let mut conditions: HashMap<String, Arc<dyn Condition>> = HashMap::new();
        let mut events: HashMap<String, Arc<dyn QuestEvent>> = HashMap::new();
        let mut failed = 0usize;

        for pack in packs.packages() {
            for (name, instruction) in &pack.conditions {
                let id = format!("{}.{}", pack.name, name);
                match self.registry.create_condition(&pack.name, instruction) {
                    Ok(condition) => {
                        conditions.insert(id, condition);
                    }
                    Err(err) => {
                        failed += 1;
                        error!("Condition {} skipped: {}", id, err);
                    }
                }
            }
            for (name, instruction) in &pack.events {
                let id = format!("{}.{}", pack.name, name);
                match self.registry.create_event(&pack.name, instruction) {
                    Ok(event) => {
                        events.insert(id, event);
                    }
                    Err(err) => {
                        failed += 1;
                        error!("Event {} skipped: {}", id, err);
                    }
                }
            }
            // Objective templates are instantiated per player at start time;
            // parse them once here so authors hear about mistakes at load.
            for (name, instruction) in &pack.objectives {
                if let Err(err) = self.registry.create_objective(&pack.name, instruction) {
                    failed += 1;
                    error!("Objective {}.{} is invalid: {}", pack.name, name, err);
                }
            }
        }

        info!(
            "Installed {} conditions and {} events ({} definitions skipped)",
            conditions.len(),
            events.len(),
            failed
        );
        self.conditions = conditions;
        self.events = events;
        self.packs = packs;
        self.sessions.clear();
    }

    pub fn packs(&self) -> &PackageRegistry {
        &self.packs
    }

    /// The in-memory record of a joined player. Offline players resolve to
    /// `None`; persistent mutations for them go through [`Self::with_record`].
    pub fn player_record(&self, player: &str) -> Option<&PlayerRecord> {
        self.players.get(player).map(|p| &p.record)
    }

    /// Evaluate a qualified condition reference for a player. A leading `!`
    /// negates the outcome. Unknown references, offline players and circular
    /// references evaluate to false without negation applying.
    pub fn condition(&self, player: &str, reference: &str) -> bool {
        let (negated, id) = match reference.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, reference),
        };
        if !self.server.is_online(player) {
            debug!("Condition {} for offline player {} is false", id, player);
            return false;
        }
        let Some(condition) = self.conditions.get(id).cloned() else {
            error!("Unknown condition referenced: {}", id);
            return false;
        };
        {
            let mut stack = self.eval_stack.borrow_mut();
            if stack.iter().any(|entry| entry == id) {
                error!("Circular condition reference involving {}", id);
                return false;
            }
            stack.push(id.to_string());
        }
        let outcome = condition.check(self, player);
        self.eval_stack.borrow_mut().pop();
        outcome != negated
    }

    fn conditions_hold(&self, player: &str, refs: &[String]) -> bool {
        refs.iter().all(|r| self.condition(player, r))
    }

    /// Fire a qualified event reference. Returns whether the event body ran.
    ///
    /// Pipeline order: resolve, static gate (no player requires a static
    /// event), persistence gate (offline player requires a persistent
    /// event), firing conditions, then the body.
    pub fn fire(&mut self, player: Option<&str>, reference: &str) -> bool {
        let Some(event) = self.events.get(reference).cloned() else {
            error!("Unknown event referenced: {}", reference);
            return false;
        };
        let spec = event.spec();
        match player {
            None if !spec.staticness => {
                error!("Event {} requires a player", reference);
                return false;
            }
            Some(p) if !self.server.is_online(p) && !spec.persistent => {
                info!("Event {} skipped: player {} is offline", reference, p);
                return false;
            }
            _ => {}
        }
        if !spec.conditions.is_empty() {
            // Firing conditions need someone to evaluate against.
            let Some(p) = player else {
                error!("Event {} has conditions but no player context", reference);
                return false;
            };
            if !self.conditions_hold(p, &spec.conditions) {
                debug!("Event {} skipped: conditions not met for {}", reference, p);
                return false;
            }
        }
        match event.run(self, player) {
            Ok(()) => true,
            Err(err) => {
                error!("Event {} failed: {}", reference, err);
                false
            }
        }
    }

    /// Fire every static event scheduled for the given hour, playerless.
    pub fn run_static_events(&mut self, hour: u8) {
        let scheduled: Vec<String> = self
            .packs
            .packages()
            .filter_map(|p| p.static_events.get(&hour))
            .flatten()
            .cloned()
            .collect();
        if !scheduled.is_empty() {
            info!("Running {} static events for hour {}", scheduled.len(), hour);
        }
        for reference in scheduled {
            self.fire(None, &reference);
        }
    }

    /// Start an objective for a joined player. The label is the player-scoped
    /// identity: starting a second objective with the same label (any case)
    /// is a logged no-op, which makes repeated quest triggers idempotent.
    /// Returns whether a new objective went live.
    pub fn start_objective(&mut self, player: &str, pack: &str, instruction: &str) -> bool {
        let ins = Instruction::new(instruction);
        let Some(label) = ins.keyed("label").map(str::to_string) else {
            error!(
                "Objective instruction has no label: {}",
                escape_log(instruction)
            );
            return false;
        };
        if !self.players.contains_key(player) {
            warn!("Cannot start objective {} for inactive player {}", label, player);
            return false;
        }
        if self.has_objective(player, &label) {
            debug!("Player {} already has objective {}", player, label);
            return false;
        }
        match self.registry.create_objective(pack, instruction) {
            Ok(objective) => {
                if let Some(active) = self.players.get_mut(player) {
                    active.objectives.push(objective);
                }
                true
            }
            Err(err) => {
                error!("Objective {} failed to parse: {}", label, err);
                false
            }
        }
    }

    fn has_objective(&self, player: &str, label: &str) -> bool {
        self.players.get(player).is_some_and(|active| {
            active
                .objectives
                .iter()
                .any(|o| o.spec().label.eq_ignore_ascii_case(label))
                || active.parked.iter().any(|stored| {
                    Instruction::new(&stored.instruction)
                        .keyed("label")
                        .is_some_and(|l| l.eq_ignore_ascii_case(label))
                })
        })
    }

    /// Labels of a joined player's active objectives.
    pub fn active_objectives(&self, player: &str) -> Vec<String> {
        self.players
            .get(player)
            .map(|active| {
                active
                    .objectives
                    .iter()
                    .map(|o| o.spec().label.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove an objective by label, live or stored. Removing a label the
    /// player does not have is not an error.
    pub fn delete_objective(&mut self, player: &str, label: &str) -> Result<(), QuestError> {
        if let Some(active) = self.players.get_mut(player) {
            active
                .objectives
                .retain(|o| !o.spec().label.eq_ignore_ascii_case(label));
            active.parked.retain(|stored| {
                !Instruction::new(&stored.instruction)
                    .keyed("label")
                    .is_some_and(|l| l.eq_ignore_ascii_case(label))
            });
            return Ok(());
        }
        let mut record = self.store.get_or_create_player(player)?;
        record.objectives.retain(|stored| {
            !Instruction::new(&stored.instruction)
                .keyed("label")
                .is_some_and(|l| l.eq_ignore_ascii_case(label))
        });
        self.store.put_player(record)
    }

    /// Apply a mutation to a player's record. For a joined player this edits
    /// the live record (persisted on save); for an offline player it is a
    /// load-mutate-save against the store, the transient-handle path that
    /// persistent events use.
    pub fn with_record(
        &mut self,
        player: &str,
        mutate: impl FnOnce(&mut PlayerRecord),
    ) -> Result<(), QuestError> {
        if let Some(active) = self.players.get_mut(player) {
            mutate(&mut active.record);
            return Ok(());
        }
        let mut record = self.store.get_or_create_player(player)?;
        mutate(&mut record);
        self.store.put_player(record)
    }

    /// Deliver a game happening to the player's objectives. Each objective's
    /// gating conditions are checked before it observes; completion fires
    /// the objective's events after the surviving set is restored, so those
    /// events may immediately start follow-up objectives.
    pub fn handle_happening(&mut self, player: &str, happening: &Happening) {
        let Some(active) = self.players.get_mut(player) else {
            return;
        };
        let mut objectives = std::mem::take(&mut active.objectives);
        let mut surviving: Vec<Box<dyn Objective>> = Vec::with_capacity(objectives.len());
        let mut completed: Vec<(String, Vec<String>)> = Vec::new();

        for mut objective in objectives.drain(..) {
            if !self.conditions_hold(player, &objective.spec().conditions) {
                surviving.push(objective);
                continue;
            }
            match objective.observe(happening) {
                Progress::Completed => {
                    let spec = objective.spec();
                    info!("Player {} completed objective {}", player, spec.label);
                    completed.push((spec.label.clone(), spec.events.clone()));
                }
                Progress::Advanced | Progress::Ignored => surviving.push(objective),
            }
        }

        if let Some(active) = self.players.get_mut(player) {
            active.objectives = surviving;
        }
        for (_, events) in completed {
            for event in events {
                self.fire(Some(player), &event);
            }
        }
    }

    /// Bring a player online: load the stored record, re-parse persisted
    /// objectives, then start every package's global location objectives
    /// (duplicate labels make this idempotent).
    pub fn player_join(&mut self, player: &str) -> Result<(), QuestError> {
        if self.players.contains_key(player) {
            return Ok(());
        }
        let record = self.store.get_or_create_player(player)?;
        let mut objectives = Vec::new();
        let mut parked = Vec::new();
        for stored in &record.objectives {
            match self
                .registry
                .create_objective(&stored.package, &stored.instruction)
            {
                Ok(objective) => objectives.push(objective),
                Err(err) => {
                    warn!(
                        "Player {}: objective \"{}\" kept but not resumed: {}",
                        player,
                        escape_log(&stored.instruction),
                        err
                    );
                    parked.push(stored.clone());
                }
            }
        }
        info!(
            "Player {} joined with {} active objectives",
            player,
            objectives.len()
        );
        self.players.insert(
            player.to_string(),
            ActivePlayer {
                record,
                objectives,
                parked,
            },
        );

        let globals: Vec<(String, String)> = self
            .packs
            .packages()
            .flat_map(|pack| {
                pack.global_locations.iter().filter_map(|name| {
                    match pack.objectives.get(name) {
                        Some(ins) => Some((pack.name.clone(), ins.clone())),
                        None => {
                            warn!(
                                "Package {}: global location {} has no objective",
                                pack.name, name
                            );
                            None
                        }
                    }
                })
            })
            .collect();
        for (pack, instruction) in globals {
            self.start_objective(player, &pack, &instruction);
        }
        Ok(())
    }

    /// Persist a joined player's state: live objectives are re-encoded as
    /// instruction strings with their current progress, parked ones go back
    /// verbatim.
    pub fn save_player(&mut self, player: &str) -> Result<(), QuestError> {
        let Some(active) = self.players.get_mut(player) else {
            return Err(QuestError::NotFound(format!("player: {}", player)));
        };
        let mut stored: Vec<StoredObjective> = active
            .objectives
            .iter()
            .map(|o| StoredObjective::new(&o.spec().pack, &o.instruction()))
            .collect();
        stored.extend(active.parked.iter().cloned());
        active.record.objectives = stored;
        self.store.put_player(active.record.clone())
    }

    /// Save and drop a player's live state, ending any conversation.
    pub fn player_leave(&mut self, player: &str) -> Result<(), QuestError> {
        self.sessions.remove(player);
        if self.players.contains_key(player) {
            self.save_player(player)?;
            self.players.remove(player);
        }
        Ok(())
    }

    pub fn save_all(&mut self) -> Result<(), QuestError> {
        let ids: Vec<String> = self.players.keys().cloned().collect();
        for id in ids {
            self.save_player(&id)?;
        }
        Ok(())
    }

    /// Begin a conversation with a player. The opener is the first entry of
    /// the graph's `first` list whose conditions hold; when none qualifies
    /// the conversation silently does not start (`Ok(None)`).
    pub fn start_conversation(
        &mut self,
        player: &str,
        conversation: &str,
    ) -> Result<Option<ConversationTurn>, QuestError> {
        let Some(graph) = self.packs.conversation(conversation).cloned() else {
            return Err(QuestError::UnknownReference(conversation.to_string()));
        };
        self.sessions.remove(player);
        for npc_id in graph.first.clone() {
            if self.npc_eligible(player, &graph, &npc_id) {
                return Ok(Some(self.present_npc(player, &graph, &npc_id)));
            }
        }
        debug!(
            "Conversation {} has no eligible opener for {}",
            conversation, player
        );
        Ok(None)
    }

    /// Start the conversation an NPC is bound to, looked up through the
    /// host's NPC directory shim. Without the shim, or for an unbound NPC
    /// id, nothing happens.
    pub fn start_npc_conversation(
        &mut self,
        player: &str,
        npc_id: &str,
    ) -> Result<Option<ConversationTurn>, QuestError> {
        let conversation = match self.server.npcs() {
            None => {
                debug!("No NPC directory; ignoring interaction with {}", npc_id);
                return Ok(None);
            }
            Some(directory) => match directory.conversation_for_npc(npc_id) {
                Some(conversation) => conversation,
                None => {
                    debug!("NPC {} has no conversation bound", npc_id);
                    return Ok(None);
                }
            },
        };
        self.start_conversation(player, &conversation)
    }

    fn npc_eligible(&self, player: &str, graph: &Conversation, npc_id: &str) -> bool {
        graph
            .npc_option(npc_id)
            .is_some_and(|o| self.conditions_hold(player, &o.conditions))
    }

    /// Speak one NPC option: show the text, fire its events, then offer the
    /// player options whose guards hold. An empty menu ends the session.
    fn present_npc(&mut self, player: &str, graph: &Conversation, npc_id: &str) -> ConversationTurn {
        let (text, events, pointers) = match graph.npc_option(npc_id) {
            Some(option) => (
                option.text.clone(),
                option.events.clone(),
                option.pointers.clone(),
            ),
            None => (String::new(), Vec::new(), Vec::new()),
        };
        self.server
            .send_message(player, &format!("{}: {}", graph.quester, text));
        for event in &events {
            self.fire(Some(player), event);
        }
        // A fired event may have started another conversation. That session
        // wins; do not overwrite it with this node's menu.
        if self.sessions.contains_key(player) {
            debug!(
                "Conversation {} superseded at {} for {}",
                graph.id, npc_id, player
            );
            return ConversationTurn {
                quester: graph.quester.clone(),
                npc_text: text,
                replies: Vec::new(),
            };
        }

        let menu: Vec<String> = pointers
            .into_iter()
            .filter(|id| {
                graph
                    .player_option(id)
                    .is_some_and(|o| self.conditions_hold(player, &o.conditions))
            })
            .collect();
        let replies: Vec<String> = menu
            .iter()
            .filter_map(|id| graph.player_option(id).map(|o| o.text.clone()))
            .collect();
        for (i, reply) in replies.iter().enumerate() {
            self.server
                .send_message(player, &format!("  {}. {}", i + 1, reply));
        }

        if menu.is_empty() {
            self.sessions.remove(player);
        } else {
            let session = ConversationSession {
                id: uuid::Uuid::new_v4(),
                player: player.to_string(),
                conversation: graph.id.clone(),
                current_npc: npc_id.to_string(),
                menu,
            };
            debug!(
                "Conversation {} session {} at {} for {}",
                graph.id, session.id, npc_id, player
            );
            self.sessions.insert(player.to_string(), session);
        }
        ConversationTurn {
            quester: graph.quester.clone(),
            npc_text: text,
            replies,
        }
    }

    /// Answer the current menu with a 1-based choice. Fires the chosen
    /// option's events, then follows its pointers to the next eligible NPC
    /// option; `Ok(None)` means the conversation ended.
    pub fn select_option(
        &mut self,
        player: &str,
        choice: usize,
    ) -> Result<Option<ConversationTurn>, QuestError> {
        let Some(session) = self.sessions.remove(player) else {
            return Err(QuestError::StateViolation(format!(
                "{} is not in a conversation",
                player
            )));
        };
        let Some(graph) = self.packs.conversation(&session.conversation).cloned() else {
            return Err(QuestError::UnknownReference(session.conversation));
        };
        let Some(option_id) = choice.checked_sub(1).and_then(|i| session.menu.get(i)) else {
            let menu_len = session.menu.len();
            self.sessions.insert(player.to_string(), session);
            return Err(QuestError::StateViolation(format!(
                "reply {} is not on the menu (1-{})",
                choice, menu_len
            )));
        };
        let (events, pointers) = match graph.player_option(option_id) {
            Some(option) => (option.events.clone(), option.pointers.clone()),
            None => (Vec::new(), Vec::new()),
        };
        for event in &events {
            self.fire(Some(player), event);
        }
        for npc_id in &pointers {
            if self.npc_eligible(player, &graph, npc_id) {
                return Ok(Some(self.present_npc(player, &graph, npc_id)));
            }
        }
        Ok(None)
    }

    pub fn in_conversation(&self, player: &str) -> bool {
        self.sessions.contains_key(player)
    }

    pub fn cancel_conversation(&mut self, player: &str) {
        self.sessions.remove(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::adapter::NpcDirectory;
    use crate::quest::package::QuestPackage;
    use crate::quest::storage::QuestStoreBuilder;
    use crate::quest::types::Location;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct TestServer {
        offline: Mutex<HashSet<String>>,
        log: Arc<Mutex<Vec<String>>>,
        npcs: Option<HashMap<String, String>>,
    }

    impl NpcDirectory for HashMap<String, String> {
        fn conversation_for_npc(&self, npc_id: &str) -> Option<String> {
            self.get(npc_id).cloned()
        }
    }

    impl GameServer for TestServer {
        fn is_online(&self, player: &str) -> bool {
            !self.offline.lock().unwrap().contains(player)
        }

        fn location(&self, _player: &str) -> Option<Location> {
            Some(Location {
                x: 0.0,
                y: 64.0,
                z: 0.0,
                world: "world".to_string(),
            })
        }

        fn health(&self, _player: &str) -> Option<f64> {
            Some(20.0)
        }

        fn level(&self, _player: &str) -> Option<i64> {
            Some(5)
        }

        fn empty_slots(&self, _player: &str) -> Option<i64> {
            Some(10)
        }

        fn item_count(&self, _player: &str, _item: &str) -> i64 {
            0
        }

        fn send_message(&self, player: &str, message: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("msg|{}|{}", player, message));
        }

        fn give_item(&self, player: &str, item: &str, amount: i64) {
            self.log
                .lock()
                .unwrap()
                .push(format!("give|{}|{}x{}", player, item, amount));
        }

        fn take_item(&self, player: &str, item: &str, amount: i64) -> i64 {
            self.log
                .lock()
                .unwrap()
                .push(format!("take|{}|{}x{}", player, item, amount));
            amount
        }

        fn teleport(&self, _player: &str, _location: &Location) {}

        fn dispatch_command(&self, command: &str) {
            self.log.lock().unwrap().push(format!("cmd|{}", command));
        }

        fn npcs(&self) -> Option<&dyn NpcDirectory> {
            self.npcs.as_ref().map(|map| map as &dyn NpcDirectory)
        }
    }

    struct Fixture {
        engine: QuestEngine,
        log: Arc<Mutex<Vec<String>>>,
        store: QuestStore,
        _dir: TempDir,
    }

    impl Fixture {
        fn new(packs: Vec<QuestPackage>) -> Self {
            Self::with_server(TestServer::default(), packs)
        }

        fn with_server(server: TestServer, packs: Vec<QuestPackage>) -> Self {
            let dir = TempDir::new().expect("tempdir");
            let store = QuestStoreBuilder::new(dir.path()).open().expect("store");
            let log = server.log.clone();
            let mut engine = QuestEngine::new(Box::new(server), store.clone());
            let mut registry = PackageRegistry::new();
            for pack in packs {
                registry.insert(pack);
            }
            engine.install_packs(registry);
            Fixture {
                engine,
                log,
                store,
                _dir: dir,
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn pack(name: &str) -> QuestPackage {
        QuestPackage::new(name)
    }

    fn define(map: &mut HashMap<String, String>, name: &str, instruction: &str) {
        map.insert(name.to_string(), instruction.to_string());
    }

    #[test]
    fn negation_applies_but_failures_stay_false() {
        let mut p = pack("p");
        define(&mut p.conditions, "started", "tag started");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();

        assert!(!f.engine.condition("alice", "p.started"));
        assert!(f.engine.condition("alice", "!p.started"));
        // Unknown references fail closed even when negated.
        assert!(!f.engine.condition("alice", "p.nope"));
        assert!(!f.engine.condition("alice", "!p.nope"));
    }

    #[test]
    fn circular_references_evaluate_false() {
        let mut p = pack("p");
        define(&mut p.conditions, "a", "and b");
        define(&mut p.conditions, "b", "or a");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();
        assert!(!f.engine.condition("alice", "p.a"));
        // The stack unwinds fully; a later evaluation starts clean.
        assert!(f.engine.eval_stack.borrow().is_empty());
    }

    #[test]
    fn firing_conditions_gate_the_event() {
        let mut p = pack("p");
        define(&mut p.conditions, "vip", "tag vip");
        define(&mut p.events, "reward", "give gold:5 event_conditions:vip");
        define(&mut p.events, "promote", "tag add vip");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();

        assert!(!f.engine.fire(Some("alice"), "p.reward"));
        assert!(f.engine.fire(Some("alice"), "p.promote"));
        assert!(f.engine.fire(Some("alice"), "p.reward"));
        assert!(f.log().contains(&"give|alice|goldx5".to_string()));
    }

    #[test]
    fn static_gate_rejects_playerless_normal_events() {
        let mut p = pack("p");
        define(&mut p.events, "greet", "message hello");
        define(&mut p.events, "announce", "command say dawn");
        let mut f = Fixture::new(vec![p]);

        assert!(!f.engine.fire(None, "p.greet"));
        assert!(f.engine.fire(None, "p.announce"));
        assert!(!f.engine.fire(Some("ghost"), "p.missing"));
        assert_eq!(f.log(), vec!["cmd|say dawn".to_string()]);
    }

    #[test]
    fn persistent_events_reach_offline_players() {
        let server = TestServer::default();
        server.offline.lock().unwrap().insert("bob".to_string());
        let mut p = pack("p");
        define(&mut p.events, "mark", "tag add visited");
        define(&mut p.events, "greet", "message hello");
        let mut f = Fixture::with_server(server, vec![p]);

        // Non-persistent events skip offline players entirely.
        assert!(!f.engine.fire(Some("bob"), "p.greet"));
        // Persistent ones mutate the stored record through a transient handle.
        assert!(f.engine.fire(Some("bob"), "p.mark"));
        let record = f.store.get_player("bob").unwrap();
        assert!(record.has_tag("visited"));
        assert!(f.engine.player_record("bob").is_none());
    }

    #[test]
    fn objective_lifecycle_with_duplicate_suppression() {
        let mut p = pack("p");
        define(
            &mut p.events,
            "slay",
            "objective mobkill ZOMBIE:2 events:praise label:slayer",
        );
        define(&mut p.events, "praise", "message well done");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();

        assert!(f.engine.fire(Some("alice"), "p.slay"));
        assert!(f.engine.fire(Some("alice"), "p.slay"));
        assert_eq!(f.engine.active_objectives("alice"), vec!["slayer"]);

        let kill = Happening::MobKilled {
            mob: "ZOMBIE".to_string(),
        };
        f.engine.handle_happening("alice", &kill);
        assert_eq!(f.engine.active_objectives("alice"), vec!["slayer"]);
        f.engine.handle_happening("alice", &kill);
        assert!(f.engine.active_objectives("alice").is_empty());
        assert!(f.log().contains(&"msg|alice|well done".to_string()));
    }

    #[test]
    fn objective_progress_survives_a_logout() {
        let mut p = pack("p");
        define(
            &mut p.events,
            "slay",
            "objective mobkill ZOMBIE:3 label:slayer",
        );
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();
        f.engine.fire(Some("alice"), "p.slay");
        f.engine.handle_happening(
            "alice",
            &Happening::MobKilled {
                mob: "ZOMBIE".to_string(),
            },
        );
        f.engine.player_leave("alice").unwrap();

        let record = f.store.get_player("alice").unwrap();
        assert_eq!(record.objectives.len(), 1);
        assert!(record.objectives[0].instruction.starts_with("mobkill ZOMBIE:2"));

        f.engine.player_join("alice").unwrap();
        assert_eq!(f.engine.active_objectives("alice"), vec!["slayer"]);
    }

    #[test]
    fn delete_objective_works_offline() {
        let mut p = pack("p");
        define(&mut p.events, "slay", "objective die label:doomed");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();
        f.engine.fire(Some("alice"), "p.slay");
        f.engine.player_leave("alice").unwrap();

        f.engine.delete_objective("alice", "DOOMED").unwrap();
        let record = f.store.get_player("alice").unwrap();
        assert!(record.objectives.is_empty());
    }

    #[test]
    fn global_location_objectives_start_on_join() {
        let mut p = pack("p");
        define(
            &mut p.objectives,
            "spawn",
            "location 0;64;0;world 5 label:spawn_marker",
        );
        p.global_locations = vec!["spawn".to_string()];
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();
        assert_eq!(f.engine.active_objectives("alice"), vec!["spawn_marker"]);
        // Rejoining does not duplicate it.
        f.engine.player_leave("alice").unwrap();
        f.engine.player_join("alice").unwrap();
        assert_eq!(f.engine.active_objectives("alice"), vec!["spawn_marker"]);
    }

    #[test]
    fn conversation_guards_filter_the_menu() {
        let mut p = pack("p");
        define(&mut p.conditions, "trusted", "tag trusted");
        define(&mut p.events, "farewell", "message safe travels");
        let json = r#"{
            "quester": "Innkeeper",
            "first": "greet",
            "npc_options": {
                "greet": { "text": "Welcome!", "pointers": "secret,leave" },
                "tell": { "text": "The cellar hides a door.", "pointers": "leave" }
            },
            "player_options": {
                "secret": { "text": "Any rumors?", "conditions": "trusted", "pointers": "tell" },
                "leave": { "text": "Goodbye.", "events": "farewell" }
            }
        }"#;
        p.conversations.insert(
            "innkeeper".to_string(),
            Conversation::parse("p", "innkeeper", json).unwrap(),
        );
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();

        let turn = f
            .engine
            .start_conversation("alice", "p.innkeeper")
            .unwrap()
            .unwrap();
        assert_eq!(turn.replies, vec!["Goodbye.".to_string()]);
        assert!(f.engine.in_conversation("alice"));

        // Choosing the only reply fires its events and ends the dialogue.
        let next = f.engine.select_option("alice", 1).unwrap();
        assert!(next.is_none());
        assert!(!f.engine.in_conversation("alice"));
        assert!(f.log().contains(&"msg|alice|safe travels".to_string()));

        // With the tag, the guarded reply appears and leads onward.
        f.engine
            .with_record("alice", |r| r.add_tag("trusted"))
            .unwrap();
        let turn = f
            .engine
            .start_conversation("alice", "p.innkeeper")
            .unwrap()
            .unwrap();
        assert_eq!(turn.replies.len(), 2);
        let next = f.engine.select_option("alice", 1).unwrap().unwrap();
        assert_eq!(next.npc_text, "The cellar hides a door.");
    }

    #[test]
    fn conversation_errors_are_reported() {
        let mut f = Fixture::new(vec![pack("p")]);
        f.engine.player_join("alice").unwrap();
        assert!(matches!(
            f.engine.start_conversation("alice", "p.ghost"),
            Err(QuestError::UnknownReference(_))
        ));
        assert!(matches!(
            f.engine.select_option("alice", 1),
            Err(QuestError::StateViolation(_))
        ));
    }

    #[test]
    fn static_events_run_for_their_hour() {
        let mut p = pack("p");
        define(&mut p.events, "dawn", "command say sunrise");
        p.static_events.insert(6, vec!["p.dawn".to_string()]);
        let mut f = Fixture::new(vec![p]);
        f.engine.run_static_events(5);
        assert!(f.log().is_empty());
        f.engine.run_static_events(6);
        assert_eq!(f.log(), vec!["cmd|say sunrise".to_string()]);
    }

    #[test]
    fn install_skips_broken_definitions_only() {
        let mut p = pack("p");
        define(&mut p.conditions, "good", "health 5");
        define(&mut p.conditions, "bad", "health lots");
        define(&mut p.events, "good", "message hi");
        define(&mut p.events, "bad", "nosuchtype x");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();
        assert!(f.engine.condition("alice", "p.good"));
        assert!(!f.engine.condition("alice", "p.bad"));
        assert!(f.engine.fire(Some("alice"), "p.good"));
        assert!(!f.engine.fire(Some("alice"), "p.bad"));
    }

    struct CapturingLogger;
    static CAPTURED_LOGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    impl log::Log for CapturingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED_LOGS
                .lock()
                .unwrap()
                .push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    #[test]
    fn logged_instructions_stay_single_line() {
        static LOGGER: CapturingLogger = CapturingLogger;
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);

        let mut f = Fixture::new(vec![pack("p")]);
        f.engine.player_join("alice").unwrap();
        // No label, so the whole instruction lands in an error line.
        assert!(!f
            .engine
            .start_objective("alice", "p", "mobkill ZOMBIE:1\nfake line"));

        let captured = CAPTURED_LOGS.lock().unwrap();
        let line = captured
            .iter()
            .find(|l| l.contains("no label"))
            .expect("missing-label error was logged");
        assert!(line.contains("\\n"), "{}", line);
        assert!(!line.contains('\n'), "{}", line);
    }

    #[test]
    fn npc_directory_routes_to_conversations() {
        let mut p = pack("p");
        let json = r#"{
            "quester": "Smith",
            "first": "hello",
            "npc_options": { "hello": { "text": "Need repairs?" } }
        }"#;
        p.conversations.insert(
            "smith".to_string(),
            Conversation::parse("p", "smith", json).unwrap(),
        );
        let mut server = TestServer::default();
        server.npcs = Some(HashMap::from([(
            "smith_npc".to_string(),
            "p.smith".to_string(),
        )]));
        let mut f = Fixture::with_server(server, vec![p]);
        f.engine.player_join("alice").unwrap();

        let turn = f.engine.start_npc_conversation("alice", "smith_npc").unwrap();
        assert_eq!(turn.unwrap().npc_text, "Need repairs?");
        // An NPC without a bound conversation is a quiet no-op.
        assert!(f
            .engine
            .start_npc_conversation("alice", "nobody")
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_npc_directory_degrades_gracefully() {
        let mut f = Fixture::new(vec![pack("p")]);
        f.engine.player_join("alice").unwrap();
        assert!(f
            .engine
            .start_npc_conversation("alice", "smith_npc")
            .unwrap()
            .is_none());
    }

    #[test]
    fn conversation_event_in_npc_line_takes_over_the_session() {
        let mut p = pack("p");
        define(&mut p.events, "handoff", "conversation p.smith");
        let guide = r#"{
            "quester": "Guide",
            "first": "greet",
            "npc_options": {
                "greet": { "text": "The smith needs you.", "events": "handoff", "pointers": "stay" }
            },
            "player_options": {
                "stay": { "text": "I would rather stay." }
            }
        }"#;
        let smith = r#"{
            "quester": "Smith",
            "first": "hello",
            "npc_options": {
                "hello": { "text": "Ah, there you are.", "pointers": "bye" },
                "sendoff": { "text": "Good luck out there." }
            },
            "player_options": {
                "bye": { "text": "Farewell, smith.", "pointers": "sendoff" }
            }
        }"#;
        p.conversations.insert(
            "guide".to_string(),
            Conversation::parse("p", "guide", guide).unwrap(),
        );
        p.conversations.insert(
            "smith".to_string(),
            Conversation::parse("p", "smith", smith).unwrap(),
        );
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();

        let turn = f
            .engine
            .start_conversation("alice", "p.guide")
            .unwrap()
            .unwrap();
        // The handoff installed the smith's session; the guide offers no menu.
        assert!(turn.replies.is_empty());
        assert!(f.engine.in_conversation("alice"));
        let next = f.engine.select_option("alice", 1).unwrap().unwrap();
        assert_eq!(next.npc_text, "Good luck out there.");
        assert!(!f.engine.in_conversation("alice"));
    }

    #[test]
    fn folder_event_applies_inner_gates() {
        let mut p = pack("p");
        define(&mut p.conditions, "vip", "tag vip");
        define(&mut p.events, "a", "give gold:1 event_conditions:vip");
        define(&mut p.events, "b", "give iron:1");
        define(&mut p.events, "both", "folder a,b");
        let mut f = Fixture::new(vec![p]);
        f.engine.player_join("alice").unwrap();
        assert!(f.engine.fire(Some("alice"), "p.both"));
        let log = f.log();
        assert!(!log.contains(&"give|alice|goldx1".to_string()));
        assert!(log.contains(&"give|alice|ironx1".to_string()));
    }
}
