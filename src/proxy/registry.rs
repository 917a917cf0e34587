//! # Peer Registry
//!
//! Router-owned bookkeeping of live peers: at most one bot peer (the most
//! recent registration wins) and an unordered set of audio-source peers.
//! `register` and `remove` report the transitions the router turns into
//! transcription-session lifecycle actions, so the empty/non-empty logic is
//! testable without live connections.
//!
//! Generic over the peer handle type: production uses
//! `Recipient<Deliver>`, tests use plain values.

use std::collections::HashMap;
use uuid::Uuid;

/// Role assigned to a peer by its first message. A peer with no role yet
/// lives only inside its connection actor; the registry never sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Bot,
    AudioSource,
}

impl PeerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerRole::Bot => "bot",
            PeerRole::AudioSource => "audio-source",
        }
    }
}

/// Audio-source set transitions the router reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The audio-source set went from empty to non-empty
    FirstSourceJoined,
    /// The audio-source set went from non-empty to empty
    LastSourceLeft,
}

/// The router's peer set.
#[derive(Debug)]
pub struct PeerRegistry<H> {
    bot: Option<(Uuid, H)>,
    sources: HashMap<Uuid, H>,
}

impl<H> Default for PeerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> PeerRegistry<H> {
    pub fn new() -> Self {
        Self {
            bot: None,
            sources: HashMap::new(),
        }
    }

    /// Add a classified peer. A new bot registration silently replaces any
    /// prior bot reference without closing it; the stale connection stays
    /// open and is cleaned up by its own disconnect.
    pub fn register(&mut self, id: Uuid, role: PeerRole, handle: H) -> Option<LifecycleSignal> {
        match role {
            PeerRole::Bot => {
                self.bot = Some((id, handle));
                None
            }
            PeerRole::AudioSource => {
                self.sources.insert(id, handle);
                if self.sources.len() == 1 {
                    Some(LifecycleSignal::FirstSourceJoined)
                } else {
                    None
                }
            }
        }
    }

    /// Remove a peer on close or error. Unknown ids (never classified, or a
    /// bot already replaced by a newer registration) are a no-op.
    pub fn remove(&mut self, id: Uuid) -> Option<LifecycleSignal> {
        if self.bot.as_ref().map(|(bot_id, _)| *bot_id == id).unwrap_or(false) {
            self.bot = None;
            return None;
        }

        if self.sources.remove(&id).is_some() && self.sources.is_empty() {
            return Some(LifecycleSignal::LastSourceLeft);
        }

        None
    }

    pub fn bot(&self) -> Option<&H> {
        self.bot.as_ref().map(|(_, handle)| handle)
    }

    pub fn has_bot(&self) -> bool {
        self.bot.is_some()
    }

    pub fn sources(&self) -> impl Iterator<Item = &H> {
        self.sources.values()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Take every handle (bot and sources) out of the registry, leaving it
    /// empty. Used on shutdown to close all peers.
    pub fn drain(&mut self) -> Vec<H> {
        let mut handles: Vec<H> = self.sources.drain().map(|(_, handle)| handle).collect();
        if let Some((_, handle)) = self.bot.take() {
            handles.push(handle);
        }
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn test_first_source_signals_exactly_once() {
        let mut registry: PeerRegistry<u32> = PeerRegistry::new();

        assert_eq!(
            registry.register(id(), PeerRole::AudioSource, 1),
            Some(LifecycleSignal::FirstSourceJoined)
        );
        // Concurrent arrivals during the same activation cycle must not
        // trigger a second start.
        assert_eq!(registry.register(id(), PeerRole::AudioSource, 2), None);
        assert_eq!(registry.register(id(), PeerRole::AudioSource, 3), None);
        assert_eq!(registry.source_count(), 3);
    }

    #[test]
    fn test_last_source_leaving_signals_teardown() {
        let mut registry: PeerRegistry<u32> = PeerRegistry::new();
        let first = id();
        let second = id();

        registry.register(first, PeerRole::AudioSource, 1);
        registry.register(second, PeerRole::AudioSource, 2);

        assert_eq!(registry.remove(first), None);
        assert_eq!(registry.remove(second), Some(LifecycleSignal::LastSourceLeft));
        assert_eq!(registry.source_count(), 0);
    }

    #[test]
    fn test_reactivation_after_teardown() {
        let mut registry: PeerRegistry<u32> = PeerRegistry::new();
        let source = id();

        registry.register(source, PeerRole::AudioSource, 1);
        registry.remove(source);

        // A fresh activation cycle starts a fresh session.
        assert_eq!(
            registry.register(id(), PeerRole::AudioSource, 2),
            Some(LifecycleSignal::FirstSourceJoined)
        );
    }

    #[test]
    fn test_bot_replacement_keeps_latest() {
        let mut registry: PeerRegistry<u32> = PeerRegistry::new();
        let old_bot = id();
        let new_bot = id();

        assert_eq!(registry.register(old_bot, PeerRole::Bot, 1), None);
        assert_eq!(registry.register(new_bot, PeerRole::Bot, 2), None);
        assert_eq!(registry.bot(), Some(&2));

        // The replaced bot's own disconnect must not clear the new one.
        assert_eq!(registry.remove(old_bot), None);
        assert_eq!(registry.bot(), Some(&2));

        registry.remove(new_bot);
        assert!(!registry.has_bot());
    }

    #[test]
    fn test_remove_unknown_peer_is_noop() {
        let mut registry: PeerRegistry<u32> = PeerRegistry::new();
        registry.register(id(), PeerRole::AudioSource, 1);
        assert_eq!(registry.remove(id()), None);
        assert_eq!(registry.source_count(), 1);
    }

    #[test]
    fn test_drain_empties_everything() {
        let mut registry: PeerRegistry<u32> = PeerRegistry::new();
        registry.register(id(), PeerRole::Bot, 1);
        registry.register(id(), PeerRole::AudioSource, 2);
        registry.register(id(), PeerRole::AudioSource, 3);

        let mut handles = registry.drain();
        handles.sort_unstable();
        assert_eq!(handles, vec![1, 2, 3]);
        assert!(!registry.has_bot());
        assert_eq!(registry.source_count(), 0);
    }
}
