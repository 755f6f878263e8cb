/// Command dispatch and handlers.
///
/// The dispatcher routes one parsed message to its handler, enforcing the
/// registration gate first. Handlers are synchronous: they mutate server
/// state and enqueue replies on client outboxes, and the connection task
/// sees them through to the sockets. Within one command, enqueue order is
/// reply order.
use tracing::warn;

use super::channel::Channel;
use super::message::Message;
use super::replies;
use super::server::{ClientId, ServerState};

/// What the connection task should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Append one `+x`/`-x` entry to an aggregated mode-change string.
fn push_change(out: &mut String, adding: bool, mode: char) {
    out.push(if adding { '+' } else { '-' });
    out.push(mode);
}

fn is_alphanumeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_channel_name(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

impl ServerState {
    /// Route one message. Unregistered clients may only use
    /// PASS/NICK/USER/CAP/QUIT; everything else is answered with 451.
    pub fn dispatch(&mut self, id: ClientId, msg: &Message) -> Flow {
        if msg.command.is_empty() {
            return Flow::Continue;
        }
        let command = msg.command.to_uppercase();

        let registered = self.client(id).map_or(false, |c| c.registered);
        if !registered
            && !matches!(
                command.as_str(),
                "PASS" | "NICK" | "USER" | "CAP" | "QUIT"
            )
        {
            let nick = self.display_nick(id);
            self.send(id, replies::err_not_registered(&nick));
            return Flow::Continue;
        }

        match command.as_str() {
            "PASS" => self.handle_pass(id, msg),
            "NICK" => self.handle_nick(id, msg),
            "USER" => self.handle_user(id, msg),
            "CAP" => self.handle_cap(id, msg),
            "JOIN" => self.handle_join(id, msg),
            "PART" => self.handle_part(id, msg),
            "PRIVMSG" | "NOTICE" => self.handle_privmsg(id, &command, msg),
            "TOPIC" => self.handle_topic(id, msg),
            "MODE" => self.handle_mode(id, msg),
            "KICK" => self.handle_kick(id, msg),
            "INVITE" => self.handle_invite(id, msg),
            "PING" => self.handle_ping(id, msg),
            "QUIT" => return self.handle_quit(id, msg),
            other => {
                warn!(command = other, "unknown command");
                let nick = self.display_nick(id);
                self.send(id, replies::err_unknown_command(&nick, other));
            }
        }
        Flow::Continue
    }

    // ── Registration ─────────────────────────────────────────────

    fn handle_pass(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        if self.client(id).map_or(false, |c| c.registered) {
            self.send(id, replies::err_already_registered(&nick));
            return;
        }
        let Some(pass) = msg.params.first().or(msg.trailing.as_ref()) else {
            self.send(id, replies::err_need_more_params(&nick, "PASS"));
            return;
        };
        let ok = pass.as_str() == self.password();
        if let Some(client) = self.client_mut(id) {
            client.password_ok = ok;
        }
        if !ok {
            self.send(id, replies::err_passwd_mismatch(&nick));
            return;
        }
        self.try_complete_registration(id);
    }

    fn handle_nick(&mut self, id: ClientId, msg: &Message) {
        let current = self.display_nick(id);
        let new = msg
            .params
            .first()
            .or(msg.trailing.as_ref())
            .cloned()
            .unwrap_or_default();

        if new.is_empty() {
            self.send(id, replies::err_no_nickname_given(&current));
            return;
        }
        if new.contains(['#', '@', ':', '&']) {
            self.send(id, replies::err_erroneus_nickname(&current, &new));
            return;
        }
        if self.nicks.contains_key(&new) {
            self.send(id, replies::err_nickname_in_use(&current, &new));
            return;
        }

        let old = self.client(id).and_then(|c| c.nick.clone());
        if let Some(ref old) = old {
            let prefix = self.user_prefix(id);
            self.nicks.remove(old);
            self.send(id, replies::nick_change(&prefix, &new));
            for channel in self.channels.values_mut() {
                if channel.is_member(old) || channel.is_invited(old) {
                    channel.update_nickname(old, &new);
                }
            }
        }

        self.nicks.insert(new.clone(), id);
        if let Some(client) = self.client_mut(id) {
            client.nick = Some(new);
        }
        self.try_complete_registration(id);
    }

    fn handle_user(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        if self.client(id).map_or(false, |c| c.registered) {
            self.send(id, replies::err_already_registered(&nick));
            return;
        }
        let realname = msg
            .trailing
            .clone()
            .or_else(|| msg.params.get(3).cloned());
        if msg.params.len() < 3 || realname.is_none() {
            self.send(id, replies::err_need_more_params(&nick, "USER"));
            return;
        }
        if let Some(client) = self.client_mut(id) {
            client.user = Some(msg.params[0].clone());
            client.realname = realname;
        }
        self.try_complete_registration(id);
    }

    /// Registered means password accepted, nick held, and USER seen; the
    /// welcome numerics go out exactly once, whichever command completed
    /// the triad.
    fn try_complete_registration(&mut self, id: ClientId) {
        let Some(client) = self.client_mut(id) else {
            return;
        };
        if client.registered
            || !client.password_ok
            || client.nick.is_none()
            || client.user.is_none()
        {
            return;
        }
        client.registered = true;
        let nick = client.nick.clone().unwrap_or_default();
        let user = client.user.clone().unwrap_or_default();
        for msg in replies::welcome(&nick, &user) {
            self.send(id, msg);
        }
    }

    fn handle_cap(&mut self, id: ClientId, msg: &Message) {
        // Minimal capability negotiation: answer LS with an empty set so
        // modern clients proceed to registration; everything else is
        // accepted silently.
        if msg.params.first().map(String::as_str) == Some("LS") {
            let nick = self.display_nick(id);
            self.send(id, replies::cap_ls(&nick));
        }
    }

    // ── Channels ─────────────────────────────────────────────────

    fn handle_join(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        let Some(chan_param) = msg.params.first() else {
            self.send(id, replies::err_need_more_params(&nick, "JOIN"));
            return;
        };
        if msg.params.len() > 2 {
            return;
        }
        let prefix = self.user_prefix(id);
        let keys: Vec<&str> = msg
            .params
            .get(1)
            .map(|k| k.split(',').collect())
            .unwrap_or_default();

        let names: Vec<&str> = chan_param.split(',').filter(|c| !c.is_empty()).collect();
        for (i, name) in names.into_iter().enumerate() {
            if !is_channel_name(name) {
                continue;
            }

            if let Some(channel) = self.channels.get(name) {
                if channel.is_member(&nick) {
                    self.send(id, replies::err_user_on_channel(&nick, &nick, name));
                    continue;
                }
                // Invitees bypass the limit and invite-only checks, but
                // still need the key.
                let invited = channel.is_invited(&nick);
                if !invited && channel.is_full() {
                    self.send(id, replies::err_channel_is_full(&nick, name));
                    continue;
                }
                if channel.is_invite_only() && !invited {
                    self.send(id, replies::err_invite_only_chan(&nick, name));
                    continue;
                }
                if let Some(key) = channel.key() {
                    if keys.get(i).copied() != Some(key) {
                        self.send(id, replies::err_bad_channel_key(&nick, name));
                        continue;
                    }
                }

                let join = replies::join(&prefix, name);
                self.broadcast(channel, &join);
                self.channels
                    .get_mut(name)
                    .expect("channel checked above")
                    .add_member(&nick, id);
            } else {
                self.channels
                    .insert(name.to_owned(), Channel::new(name, &nick, id));
            }

            self.greet_joined_user(id, &nick, &prefix, name);
        }
    }

    /// The composite greeting a joiner receives: JOIN echo, the mode line
    /// when they are the sole member, the topic when one is set, NAMES.
    fn greet_joined_user(&self, id: ClientId, nick: &str, prefix: &str, name: &str) {
        let Some(channel) = self.channels.get(name) else {
            return;
        };
        self.send(id, replies::join(prefix, name));
        if channel.member_count() == 1 {
            self.send(id, replies::channel_modes(name, &channel.mode_string()));
        }
        if !channel.topic().is_empty() {
            self.send(id, replies::rpl_topic(nick, name, channel.topic()));
        }
        self.send(id, replies::rpl_namreply(nick, name, &channel.names_list()));
        self.send(id, replies::rpl_endofnames(nick, name));
    }

    fn handle_part(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        let Some(chan_param) = msg.params.first() else {
            self.send(id, replies::err_need_more_params(&nick, "PART"));
            return;
        };
        let reason = msg.trailing.clone().unwrap_or_default();
        let prefix = self.user_prefix(id);

        for name in chan_param.split(',').filter(|c| !c.is_empty()) {
            let Some(channel) = self.channels.get(name) else {
                self.send(id, replies::err_no_such_channel(&nick, name));
                continue;
            };
            if !channel.is_member(&nick) {
                self.send(id, replies::err_not_on_channel(&nick, name));
                continue;
            }

            let part = replies::part(&prefix, name, &reason);
            self.broadcast(channel, &part);

            let channel = self.channels.get_mut(name).expect("channel checked above");
            channel.remove_member(&nick);
            if channel.is_empty() {
                self.channels.remove(name);
            }
        }
    }

    // ── Messaging ────────────────────────────────────────────────

    fn handle_privmsg(&mut self, id: ClientId, command: &str, msg: &Message) {
        let nick = self.display_nick(id);
        let Some(target) = msg.params.first() else {
            self.send(id, replies::err_no_recipient(&nick));
            return;
        };
        let text = msg.trailing.as_deref().unwrap_or("");
        if text.is_empty() {
            self.send(id, replies::err_no_text_to_send(&nick));
            return;
        }

        let prefix = self.user_prefix(id);
        let relay = replies::privmsg(&prefix, command, target, text);

        if is_channel_name(target) {
            let Some(channel) = self.channels.get(target.as_str()) else {
                self.send(id, replies::err_cannot_send_to_chan(&nick, target));
                return;
            };
            if !channel.is_member(&nick) {
                self.send(id, replies::err_cannot_send_to_chan(&nick, target));
                return;
            }
            self.broadcast_except(channel, id, &relay);
        } else {
            match self.lookup_nick(target) {
                Some(recipient) => self.send(recipient, relay),
                None => self.send(id, replies::err_no_such_nick(&nick, target)),
            }
        }
    }

    // ── Topic ────────────────────────────────────────────────────

    fn handle_topic(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        let Some(name) = msg.params.first() else {
            self.send(id, replies::err_need_more_params(&nick, "TOPIC"));
            return;
        };
        if !is_channel_name(name) {
            return;
        }
        let Some(channel) = self.channels.get(name.as_str()) else {
            self.send(id, replies::err_no_such_channel(&nick, name));
            return;
        };
        if !channel.is_member(&nick) {
            self.send(id, replies::err_not_on_channel(&nick, name));
            return;
        }

        let new_topic = msg.trailing.as_deref().unwrap_or("");
        if new_topic.is_empty() {
            if channel.topic().is_empty() {
                self.send(id, replies::rpl_no_topic(&nick, name));
            } else {
                self.send(id, replies::rpl_topic(&nick, name, channel.topic()));
            }
            return;
        }

        if channel.is_topic_locked() && !channel.is_operator(&nick) {
            self.send(id, replies::err_chanop_privs_needed(&nick, name));
            return;
        }

        let prefix = self.user_prefix(id);
        self.channels
            .get_mut(name.as_str())
            .expect("channel checked above")
            .set_topic(new_topic);
        let change = replies::topic_change(&prefix, name, new_topic);
        self.broadcast(&self.channels[name.as_str()], &change);
    }

    // ── Modes ────────────────────────────────────────────────────

    fn handle_mode(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);

        // Mode arguments may arrive in the trailing; fold them back in.
        let mut params = msg.params.clone();
        if let Some(trailing) = msg.trailing.as_deref() {
            params.extend(trailing.split_whitespace().map(str::to_owned));
        }

        let Some(target) = params.first().cloned() else {
            self.send(id, replies::err_need_more_params(&nick, "MODE"));
            return;
        };

        if !is_channel_name(&target) {
            // A known user as target is silently ignored; anything else
            // gets the no-such-channel reply.
            if !self.nicks.contains_key(&target) {
                self.send(id, replies::err_no_such_channel(&nick, &target));
            }
            return;
        }

        if !self.channels.contains_key(&target) {
            self.send(id, replies::err_no_such_channel(&nick, &target));
            return;
        }
        if params.len() == 1 {
            let modes = self.channels[&target].mode_string();
            self.send(id, replies::rpl_channel_mode_is(&nick, &target, &modes));
            return;
        }
        if !self.channels[&target].is_operator(&nick) {
            self.send(id, replies::err_chanop_privs_needed(&nick, &target));
            return;
        }

        let modestring = params[1].clone();
        let mut args = params.iter().skip(2);
        let mut adding = true;
        let mut applied = String::new();
        let mut out: Vec<Message> = Vec::new();

        {
            let channel = self.channels.get_mut(&target).expect("channel checked above");
            for mode in modestring.chars() {
                match mode {
                    '+' => adding = true,
                    '-' => adding = false,
                    'i' => {
                        if channel.set_invite_only(adding) {
                            push_change(&mut applied, adding, 'i');
                        }
                    }
                    't' => {
                        if channel.set_topic_locked(adding) {
                            push_change(&mut applied, adding, 't');
                        }
                    }
                    'k' => {
                        if adding {
                            match args.next() {
                                Some(key) if is_alphanumeric(key) => {
                                    if channel.set_key(key) {
                                        push_change(&mut applied, adding, 'k');
                                    }
                                }
                                Some(key) => out.push(replies::err_invalid_mode_param(
                                    &nick,
                                    &target,
                                    'k',
                                    key,
                                    "Channel key must be alphanumeric",
                                )),
                                None => out
                                    .push(replies::err_need_more_params(&nick, "MODE +k")),
                            }
                        } else if channel.remove_key() {
                            push_change(&mut applied, adding, 'k');
                        }
                    }
                    'l' => {
                        if adding {
                            match args.next() {
                                Some(arg) => match arg.parse::<u32>() {
                                    Ok(limit) if limit > 0 => {
                                        if channel.set_limit(limit) {
                                            push_change(&mut applied, adding, 'l');
                                        }
                                    }
                                    _ => out.push(replies::err_invalid_mode_param(
                                        &nick,
                                        &target,
                                        'l',
                                        arg,
                                        "Limit must be a positive integer",
                                    )),
                                },
                                None => out
                                    .push(replies::err_need_more_params(&nick, "MODE +l")),
                            }
                        } else if channel.remove_limit() {
                            push_change(&mut applied, adding, 'l');
                        }
                    }
                    'o' => match args.next() {
                        Some(target_nick) => {
                            if !channel.is_member(target_nick) {
                                out.push(replies::err_user_not_in_channel(
                                    &nick,
                                    target_nick,
                                    &target,
                                ));
                            } else if adding {
                                if channel.add_operator(target_nick) {
                                    push_change(&mut applied, adding, 'o');
                                }
                            } else if channel.remove_operator(target_nick) {
                                push_change(&mut applied, adding, 'o');
                            }
                        }
                        None => out.push(replies::err_need_more_params(&nick, "MODE o")),
                    },
                    'b' => {} // accepted and ignored
                    other => out.push(replies::err_unknown_mode(&nick, other)),
                }
            }
        }

        for reply in out {
            self.send(id, reply);
        }
        // One aggregated broadcast for whatever actually changed; no-op
        // toggles contribute nothing.
        if !applied.is_empty() {
            let prefix = self.user_prefix(id);
            let change = replies::mode_change(&prefix, &target, &applied);
            self.broadcast(&self.channels[&target], &change);
        }
    }

    // ── Kicks & invites ──────────────────────────────────────────

    fn handle_kick(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        if msg.params.len() < 2 {
            self.send(id, replies::err_need_more_params(&nick, "KICK"));
            return;
        }
        let name = msg.params[0].clone();
        let comment = msg.trailing.clone().unwrap_or_default();

        {
            let Some(channel) = self.channels.get(&name) else {
                self.send(id, replies::err_no_such_channel(&nick, &name));
                return;
            };
            if !channel.is_member(&nick) {
                self.send(id, replies::err_not_on_channel(&nick, &name));
                return;
            }
            if !channel.is_operator(&nick) {
                self.send(id, replies::err_chanop_privs_needed(&nick, &name));
                return;
            }
        }

        let prefix = self.user_prefix(id);
        for target in msg.params[1].split(',').filter(|t| !t.is_empty()) {
            if target == nick {
                self.send(id, replies::err_cant_kick_self(&nick, &name));
                continue;
            }
            let Some(channel) = self.channels.get(&name) else {
                break;
            };
            if !channel.is_member(target) {
                self.send(id, replies::err_user_not_in_channel(&nick, target, &name));
                continue;
            }

            let kick = replies::kick(&prefix, &name, target, &comment);
            self.broadcast(channel, &kick);

            let channel = self.channels.get_mut(&name).expect("channel checked above");
            channel.remove_member(target);
            if channel.is_empty() {
                self.channels.remove(&name);
            }
        }
    }

    fn handle_invite(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        if msg.params.len() < 2 {
            self.send(id, replies::err_need_more_params(&nick, "INVITE"));
            return;
        }
        let target = &msg.params[0];
        let name = &msg.params[1];

        let Some(channel) = self.channels.get(name.as_str()) else {
            self.send(id, replies::err_no_such_channel(&nick, name));
            return;
        };
        if !channel.is_member(&nick) {
            self.send(id, replies::err_not_on_channel(&nick, name));
            return;
        }
        let Some(target_id) = self.lookup_nick(target) else {
            self.send(id, replies::err_no_such_nick(&nick, target));
            return;
        };
        if channel.is_member(target) {
            self.send(id, replies::err_user_on_channel(&nick, target, name));
            return;
        }
        if channel.is_invite_only() && !channel.is_operator(&nick) {
            self.send(id, replies::err_chanop_privs_needed(&nick, name));
            return;
        }

        let prefix = self.user_prefix(id);
        self.channels
            .get_mut(name.as_str())
            .expect("channel checked above")
            .invite(target, target_id);
        self.send(id, replies::rpl_inviting(&nick, target, name));
        self.send(target_id, replies::invite(&prefix, target, name));
    }

    // ── Misc ─────────────────────────────────────────────────────

    fn handle_ping(&mut self, id: ClientId, msg: &Message) {
        let nick = self.display_nick(id);
        let Some(token) = msg
            .params
            .first()
            .map(String::as_str)
            .or(msg.trailing.as_deref())
        else {
            self.send(id, replies::err_need_more_params(&nick, "PING"));
            return;
        };
        self.send(id, replies::pong(token));
    }

    fn handle_quit(&mut self, id: ClientId, msg: &Message) -> Flow {
        let reason = msg.trailing.clone().unwrap_or_default();
        self.remove_client(id, &reason);
        Flow::Quit
    }
}
