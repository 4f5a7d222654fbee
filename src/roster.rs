//! Lobby roster and the reconciliation rules applied to it.
//!
//! A [`LobbyRoster`] is the ordered list of players currently in one match
//! lobby. It is seeded once from the create/join response and afterwards
//! mutated only through [`LobbyRoster::apply`], which implements the
//! reconciliation rules for pushed [`RosterEvent`]s:
//!
//! | Event           | Member present              | Member absent   |
//! |-----------------|-----------------------------|-----------------|
//! | `PlayerJoined`  | no-op (duplicate delivery)  | append          |
//! | `PlayerLeft`    | remove                      | no-op           |
//! | `ReadyChanged`  | update `is_ready` in place  | no-op           |
//! | `GameStarted`   | no roster mutation          | —               |
//!
//! Events are applied strictly in the order they are handed in. Nothing here
//! performs I/O or synchronization; single-writer access is guaranteed by
//! the [`dispatcher`](crate::dispatcher).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::UserId;

/// One participant in a match lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_ready: bool,
}

impl LobbyMember {
    /// Create a member that is neither host nor ready.
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            is_host: false,
            is_ready: false,
        }
    }

    /// Mark the member as the lobby host.
    #[must_use]
    pub fn with_host(mut self, is_host: bool) -> Self {
        self.is_host = is_host;
        self
    }

    /// Set the member's ready flag.
    #[must_use]
    pub fn with_ready(mut self, is_ready: bool) -> Self {
        self.is_ready = is_ready;
        self
    }
}

/// A pushed lobby event, already stripped of its match id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    PlayerJoined(LobbyMember),
    PlayerLeft { user_id: UserId },
    ReadyChanged { user_id: UserId, is_ready: bool },
    /// The host started the game; the roster itself does not change.
    GameStarted,
}

/// Observable effect of applying one [`RosterEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    /// `member` was appended at `index`.
    Appended { index: usize, member: LobbyMember },
    /// `member` was removed from `index`.
    Removed { index: usize, member: LobbyMember },
    /// The member at `index` changed in place; `member` is its new value.
    Updated { index: usize, member: LobbyMember },
    GameStarted,
}

/// Ordered collection of lobby members, keyed by `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LobbyRoster {
    members: Vec<LobbyMember>,
}

impl LobbyRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from the initial member batch of a create/join response.
    ///
    /// Keeps the batch order. Repeated user ids keep their first occurrence,
    /// and only the first host claim is honored.
    pub fn seeded(members: impl IntoIterator<Item = LobbyMember>) -> Self {
        let mut roster = Self::new();
        for member in members {
            if roster.contains(member.user_id) {
                warn!(user_id = member.user_id, "duplicate member in roster snapshot; skipping");
                continue;
            }
            roster.push(member);
        }
        roster
    }

    /// Apply one event, returning what changed (`None` for no-ops).
    pub fn apply(&mut self, event: &RosterEvent) -> Option<RosterChange> {
        match event {
            RosterEvent::PlayerJoined(member) => {
                if self.contains(member.user_id) {
                    debug!(user_id = member.user_id, "duplicate join ignored");
                    return None;
                }
                let index = self.push(member.clone());
                let member = self.members.get(index)?.clone();
                Some(RosterChange::Appended { index, member })
            }
            RosterEvent::PlayerLeft { user_id } => {
                let Some(index) = self.position(*user_id) else {
                    debug!(user_id, "leave for unknown member ignored");
                    return None;
                };
                let member = self.members.remove(index);
                Some(RosterChange::Removed { index, member })
            }
            RosterEvent::ReadyChanged { user_id, is_ready } => {
                let Some(index) = self.position(*user_id) else {
                    debug!(user_id, "ready change for unknown member ignored");
                    return None;
                };
                let member = self.members.get_mut(index)?;
                member.is_ready = *is_ready;
                Some(RosterChange::Updated {
                    index,
                    member: member.clone(),
                })
            }
            RosterEvent::GameStarted => Some(RosterChange::GameStarted),
        }
    }

    /// Members in roster order.
    pub fn members(&self) -> &[LobbyMember] {
        &self.members
    }

    /// Look up a member by id.
    pub fn member(&self, user_id: UserId) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// Returns `true` if `user_id` is in the roster.
    pub fn contains(&self, user_id: UserId) -> bool {
        self.position(user_id).is_some()
    }

    /// The current host, if any.
    pub fn host(&self) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.is_host)
    }

    /// Returns `true` if `user_id` is in the roster and is the host.
    pub fn is_host(&self, user_id: UserId) -> bool {
        self.member(user_id).is_some_and(|m| m.is_host)
    }

    /// Returns `true` when every member is ready (and there is at least one).
    pub fn all_ready(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.is_ready)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LobbyMember> {
        self.members.iter()
    }

    fn position(&self, user_id: UserId) -> Option<usize> {
        self.members.iter().position(|m| m.user_id == user_id)
    }

    /// Append a member the caller has checked is new, demoting a second host.
    fn push(&mut self, mut member: LobbyMember) -> usize {
        if member.is_host {
            if let Some(host) = self.host() {
                warn!(
                    user_id = member.user_id,
                    host = host.user_id,
                    "lobby already has a host; demoting newcomer"
                );
                member.is_host = false;
            }
        }
        self.members.push(member);
        self.members.len() - 1
    }
}

impl<'a> IntoIterator for &'a LobbyRoster {
    type Item = &'a LobbyMember;
    type IntoIter = std::slice::Iter<'a, LobbyMember>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn joined(user_id: UserId) -> RosterEvent {
        RosterEvent::PlayerJoined(LobbyMember::new(user_id, format!("player-{user_id}")))
    }

    fn left(user_id: UserId) -> RosterEvent {
        RosterEvent::PlayerLeft { user_id }
    }

    fn ready(user_id: UserId, is_ready: bool) -> RosterEvent {
        RosterEvent::ReadyChanged { user_id, is_ready }
    }

    fn ids(roster: &LobbyRoster) -> Vec<UserId> {
        roster.iter().map(|m| m.user_id).collect()
    }

    #[test]
    fn joins_append_in_arrival_order() {
        let mut roster = LobbyRoster::new();
        roster.apply(&joined(3));
        roster.apply(&joined(1));
        roster.apply(&joined(2));
        assert_eq!(ids(&roster), vec![3, 1, 2]);
    }

    #[test]
    fn join_reports_appended_index() {
        let mut roster = LobbyRoster::seeded([LobbyMember::new(1, "a")]);
        let change = roster.apply(&joined(2)).unwrap();
        assert_eq!(
            change,
            RosterChange::Appended {
                index: 1,
                member: LobbyMember::new(2, "player-2"),
            }
        );
    }

    #[test]
    fn duplicate_join_is_idempotent() {
        let mut once = LobbyRoster::new();
        once.apply(&joined(4));

        let mut twice = LobbyRoster::new();
        twice.apply(&joined(4));
        assert_eq!(twice.apply(&joined(4)), None);

        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_join_does_not_overwrite_ready_state() {
        let mut roster = LobbyRoster::new();
        roster.apply(&joined(4));
        roster.apply(&ready(4, true));
        roster.apply(&joined(4));
        assert!(roster.member(4).unwrap().is_ready);
    }

    #[test]
    fn leave_and_ready_for_absent_member_are_noops() {
        let mut roster = LobbyRoster::seeded([LobbyMember::new(1, "a")]);
        let before = roster.clone();
        assert_eq!(roster.apply(&left(99)), None);
        assert_eq!(roster.apply(&ready(99, true)), None);
        assert_eq!(roster, before);
    }

    #[test]
    fn left_member_never_reappears() {
        let mut roster = LobbyRoster::new();
        for event in [joined(1), joined(2), left(1)] {
            roster.apply(&event);
        }
        assert_eq!(ids(&roster), vec![2]);
    }

    #[test]
    fn leave_reports_removed_index() {
        let mut roster = LobbyRoster::seeded([LobbyMember::new(1, "a"), LobbyMember::new(2, "b")]);
        let change = roster.apply(&left(2)).unwrap();
        assert_eq!(
            change,
            RosterChange::Removed {
                index: 1,
                member: LobbyMember::new(2, "b"),
            }
        );
    }

    #[test]
    fn ready_change_updates_in_place() {
        let mut roster = LobbyRoster::seeded([
            LobbyMember::new(1, "a").with_host(true),
            LobbyMember::new(2, "b"),
        ]);
        let change = roster.apply(&ready(1, true)).unwrap();
        assert_eq!(
            change,
            RosterChange::Updated {
                index: 0,
                member: LobbyMember::new(1, "a").with_host(true).with_ready(true),
            }
        );
        assert_eq!(ids(&roster), vec![1, 2]);
    }

    #[test]
    fn game_started_does_not_mutate() {
        let mut roster = LobbyRoster::seeded([LobbyMember::new(1, "a")]);
        let before = roster.clone();
        assert_eq!(roster.apply(&RosterEvent::GameStarted), Some(RosterChange::GameStarted));
        assert_eq!(roster, before);
    }

    #[test]
    fn second_host_is_demoted() {
        let mut roster = LobbyRoster::seeded([LobbyMember::new(1, "a").with_host(true)]);
        roster.apply(&RosterEvent::PlayerJoined(
            LobbyMember::new(2, "b").with_host(true),
        ));
        assert!(roster.is_host(1));
        assert!(!roster.is_host(2));
        assert_eq!(roster.iter().filter(|m| m.is_host).count(), 1);
    }

    #[test]
    fn host_can_join_after_previous_host_left() {
        let mut roster = LobbyRoster::seeded([LobbyMember::new(1, "a").with_host(true)]);
        roster.apply(&left(1));
        roster.apply(&RosterEvent::PlayerJoined(
            LobbyMember::new(2, "b").with_host(true),
        ));
        assert!(roster.is_host(2));
    }

    #[test]
    fn seeding_dedupes_and_keeps_order() {
        let roster = LobbyRoster::seeded([
            LobbyMember::new(5, "first"),
            LobbyMember::new(6, "b"),
            LobbyMember::new(5, "second"),
        ]);
        assert_eq!(ids(&roster), vec![5, 6]);
        assert_eq!(roster.member(5).unwrap().display_name, "first");
    }

    #[test]
    fn all_ready_requires_members() {
        let mut roster = LobbyRoster::new();
        assert!(!roster.all_ready());
        roster.apply(&joined(1));
        roster.apply(&joined(2));
        roster.apply(&ready(1, true));
        assert!(!roster.all_ready());
        roster.apply(&ready(2, true));
        assert!(roster.all_ready());
    }

    /// Deterministic xorshift so the sequence test needs no extra crates.
    fn next(state: &mut u64) -> u64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        *state
    }

    #[test]
    fn random_sequences_match_net_join_model() {
        let mut seed = 0x9E37_79B9_7F4A_7C15_u64;
        for _ in 0..500 {
            let mut roster = LobbyRoster::new();
            // Model: id -> is_ready for members with a net-unbalanced join.
            let mut model: BTreeMap<UserId, bool> = BTreeMap::new();
            let mut order: Vec<UserId> = Vec::new();

            for _ in 0..40 {
                let user_id = (next(&mut seed) % 6) as UserId + 1;
                let event = match next(&mut seed) % 3 {
                    0 => joined(user_id),
                    1 => left(user_id),
                    _ => ready(user_id, next(&mut seed) % 2 == 0),
                };
                roster.apply(&event);

                match event {
                    RosterEvent::PlayerJoined(m) => {
                        if !model.contains_key(&m.user_id) {
                            model.insert(m.user_id, false);
                            order.push(m.user_id);
                        }
                    }
                    RosterEvent::PlayerLeft { user_id } => {
                        model.remove(&user_id);
                        order.retain(|id| *id != user_id);
                    }
                    RosterEvent::ReadyChanged { user_id, is_ready } => {
                        if let Some(r) = model.get_mut(&user_id) {
                            *r = is_ready;
                        }
                    }
                    RosterEvent::GameStarted => {}
                }
            }

            assert_eq!(ids(&roster), order);
            for member in &roster {
                assert_eq!(Some(&member.is_ready), model.get(&member.user_id));
            }
        }
    }
}
