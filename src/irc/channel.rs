/// Channel state: membership, operators, invites, topic, key, limit.
///
/// Channels do not own clients. Members are recorded as nick → [`ClientId`]
/// entries into the server's client table; a nick change rekeys every map
/// through [`Channel::update_nickname`]. Ordered maps keep promotion and
/// NAMES output deterministic.
use std::collections::BTreeMap;

use super::server::ClientId;

#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    users: BTreeMap<String, ClientId>,
    operators: BTreeMap<String, ClientId>,
    invite_list: BTreeMap<String, ClientId>,
    topic: String,
    key: Option<String>,
    limit: Option<u32>,
    invite_only: bool,
    topic_locked: bool,
}

impl Channel {
    /// Create a channel with its creator as sole member and operator.
    /// New channels start topic-locked.
    pub fn new(name: &str, creator_nick: &str, creator: ClientId) -> Self {
        let mut users = BTreeMap::new();
        users.insert(creator_nick.to_owned(), creator);
        let operators = users.clone();
        Channel {
            name: name.to_owned(),
            users,
            operators,
            invite_list: BTreeMap::new(),
            topic: String::new(),
            key: None,
            limit: None,
            invite_only: false,
            topic_locked: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn is_invite_only(&self) -> bool {
        self.invite_only
    }

    pub fn is_topic_locked(&self) -> bool {
        self.topic_locked
    }

    pub fn is_member(&self, nick: &str) -> bool {
        self.users.contains_key(nick)
    }

    pub fn is_operator(&self, nick: &str) -> bool {
        self.operators.contains_key(nick)
    }

    pub fn is_invited(&self, nick: &str) -> bool {
        self.invite_list.contains_key(nick)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.users.len()
    }

    /// Whether admission would exceed the user limit.
    pub fn is_full(&self) -> bool {
        matches!(self.limit, Some(limit) if self.users.len() >= limit as usize)
    }

    /// Ids of all members, in nick order.
    pub fn member_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.users.values().copied()
    }

    /// Admit a client. Consumes any pending invite; the first member of an
    /// operator-less channel is promoted.
    pub fn add_member(&mut self, nick: &str, id: ClientId) {
        self.users.insert(nick.to_owned(), id);
        self.invite_list.remove(nick);
        if self.operators.is_empty() {
            self.operators.insert(nick.to_owned(), id);
        }
    }

    /// Remove a member. If that drained the operator set while members
    /// remain, the first remaining user (nick order) is promoted so the
    /// channel never ends up op-less.
    pub fn remove_member(&mut self, nick: &str) {
        self.operators.remove(nick);
        self.users.remove(nick);
        self.refill_operators();
    }

    /// Grant operator status. No-op unless the nick is a member; returns
    /// whether the operator set changed.
    pub fn add_operator(&mut self, nick: &str) -> bool {
        match self.users.get(nick) {
            Some(&id) => self.operators.insert(nick.to_owned(), id).is_none(),
            None => false,
        }
    }

    /// Drop operator status, refilling from the membership if the set would
    /// be left empty. Returns whether the nick was an operator.
    pub fn remove_operator(&mut self, nick: &str) -> bool {
        let removed = self.operators.remove(nick).is_some();
        self.refill_operators();
        removed
    }

    fn refill_operators(&mut self) {
        if self.operators.is_empty() {
            if let Some((nick, &id)) = self.users.iter().next() {
                self.operators.insert(nick.clone(), id);
            }
        }
    }

    /// Record a one-shot invite, letting the nick past `+i` and `+l`.
    pub fn invite(&mut self, nick: &str, id: ClientId) {
        self.invite_list.insert(nick.to_owned(), id);
    }

    /// Set the topic. Setting a topic always locks it.
    pub fn set_topic(&mut self, topic: &str) {
        self.topic = topic.to_owned();
        self.topic_locked = true;
    }

    /// Returns whether the flag changed.
    pub fn set_invite_only(&mut self, on: bool) -> bool {
        if self.invite_only == on {
            return false;
        }
        self.invite_only = on;
        true
    }

    /// Returns whether the flag changed.
    pub fn set_topic_locked(&mut self, on: bool) -> bool {
        if self.topic_locked == on {
            return false;
        }
        self.topic_locked = on;
        true
    }

    /// Set the channel key. No-op while a key is already set; the caller
    /// has validated that the key is alphanumeric.
    pub fn set_key(&mut self, key: &str) -> bool {
        if self.key.is_some() {
            return false;
        }
        self.key = Some(key.to_owned());
        true
    }

    /// Clear the channel key. Returns whether one was set.
    pub fn remove_key(&mut self) -> bool {
        self.key.take().is_some()
    }

    /// Set the user limit. No-op while a limit is already set; the caller
    /// has validated `limit > 0`.
    pub fn set_limit(&mut self, limit: u32) -> bool {
        if self.limit.is_some() {
            return false;
        }
        self.limit = Some(limit);
        true
    }

    /// Clear the user limit. Returns whether one was set.
    pub fn remove_limit(&mut self) -> bool {
        self.limit.take().is_some()
    }

    /// Rekey a nick in every map that holds it.
    pub fn update_nickname(&mut self, old: &str, new: &str) {
        for map in [
            &mut self.users,
            &mut self.operators,
            &mut self.invite_list,
        ] {
            if let Some(id) = map.remove(old) {
                map.insert(new.to_owned(), id);
            }
        }
    }

    /// Member nicks for RPL_NAMREPLY, operators prefixed `@`, nick order.
    pub fn names_list(&self) -> String {
        let mut names = String::new();
        for nick in self.users.keys() {
            if !names.is_empty() {
                names.push(' ');
            }
            if self.operators.contains_key(nick) {
                names.push('@');
            }
            names.push_str(nick);
        }
        names
    }

    /// Current modes as `+` plus flag letters in alphabetical order.
    /// `o` is derived: present whenever the operator set is non-empty.
    pub fn mode_string(&self) -> String {
        let mut flags = String::new();
        if self.invite_only {
            flags.push('i');
        }
        if self.key.is_some() {
            flags.push('k');
        }
        if self.limit.is_some() {
            flags.push('l');
        }
        if !self.operators.is_empty() {
            flags.push('o');
        }
        if self.topic_locked {
            flags.push('t');
        }
        if flags.is_empty() {
            "+".into()
        } else {
            format!("+{flags}")
        }
    }
}
