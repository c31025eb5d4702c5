use crate::player::Player;
use crate::types::PlayerId;
use ludum_core::TransportId;
use serde_json::Value;

/// Players of one game in join order, plus the ids of whoever may act.
#[derive(Debug, Default)]
pub struct Roster {
    players: Vec<Player>,
    active: Vec<PlayerId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn push(&mut self, player: Player) {
        self.players.push(player);
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    pub fn find_by_transport(&self, transport: TransportId) -> Option<&Player> {
        self.players.iter().find(|p| p.transport().id() == transport)
    }

    /// Public records of every player, in join order.
    pub fn serialize(&self) -> Vec<Value> {
        self.players.iter().map(Player::serialize).collect()
    }

    pub fn active(&self) -> &[PlayerId] {
        &self.active
    }

    pub fn set_active(&mut self, ids: Vec<PlayerId>) {
        self.active = ids;
    }

    /// Who plays next. With nobody active, `pick` chooses an index in
    /// `0..len`; otherwise the player after the first active one, wrapping
    /// to the start. An active id that is no longer on the roster restarts
    /// the rotation at the first player.
    pub fn next_active(&self, pick: impl FnOnce(usize) -> usize) -> Option<PlayerId> {
        if self.players.is_empty() {
            return None;
        }

        let index = match self.active.first() {
            None => pick(self.players.len()) % self.players.len(),
            Some(current) => self
                .position(current)
                .map(|i| (i + 1) % self.players.len())
                .unwrap_or(0),
        };

        Some(self.players[index].id().to_owned())
    }

    pub fn take_players(&mut self) -> Vec<Player> {
        self.active.clear();
        std::mem::take(&mut self.players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludum_core::{LocalTransport, Transport};
    use serde_json::Map;
    use std::sync::Arc;

    fn roster_of(ids: &[&str]) -> (Roster, Vec<Arc<LocalTransport>>) {
        let mut roster = Roster::new();
        let mut remotes = Vec::new();
        for id in ids {
            let (transport, remote) = LocalTransport::pair();
            roster.push(Player::new((*id).to_owned(), transport, Map::new()));
            remotes.push(remote);
        }
        (roster, remotes)
    }

    #[tokio::test]
    async fn test_rotation_wraps() {
        let (mut roster, _remotes) = roster_of(&["a", "b", "c"]);
        let mut order = Vec::new();

        for _ in 0..4 {
            let next = roster.next_active(|_| 0).unwrap();
            roster.set_active(vec![next.clone()]);
            order.push(next);
        }

        assert_eq!(order, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_random_pick_when_nobody_active() {
        let (roster, _remotes) = roster_of(&["a", "b", "c"]);
        let mut seen_len = 0;

        let next = roster.next_active(|len| {
            seen_len = len;
            2
        });

        assert_eq!(seen_len, 3);
        assert_eq!(next.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_unknown_active_restarts_rotation() {
        let (mut roster, _remotes) = roster_of(&["a", "b"]);
        roster.set_active(vec!["gone".to_owned()]);

        assert_eq!(roster.next_active(|_| 1).as_deref(), Some("a"));
        assert_eq!(Roster::new().next_active(|_| 0), None);
    }

    #[tokio::test]
    async fn test_find_by_transport() {
        let (roster, _remotes) = roster_of(&["a", "b"]);
        let second = roster.players()[1].transport().id();

        assert_eq!(roster.find_by_transport(second).map(Player::id), Some("b"));
        assert_eq!(roster.position("b"), Some(1));
    }
}
