/// Reply constructors: the standard numerics and the server-relayed command
/// forms (JOIN/PART/KICK/TOPIC/MODE/NICK/QUIT/INVITE/PONG/PRIVMSG).
///
/// Numeric texts follow RFC 1459 phrasing. Server-origin replies carry the
/// host name as prefix; relayed commands carry the acting client's
/// `nick!user@host`.
use super::message::Message;
use super::server::SERVER_NAME;

/// `nick!user@host` prefix for messages relayed on behalf of a client.
pub fn user_id(nick: &str, user: &str) -> String {
    format!("{nick}!{user}@{}", *SERVER_NAME)
}

fn numeric(code: &str, params: Vec<String>, trailing: Option<&str>) -> Message {
    Message {
        prefix: Some(SERVER_NAME.clone()),
        command: code.to_owned(),
        params,
        trailing: trailing.map(str::to_owned),
    }
}

fn relayed(prefix: &str, command: &str, params: Vec<String>, trailing: Option<&str>) -> Message {
    Message {
        prefix: Some(prefix.to_owned()),
        command: command.to_owned(),
        params,
        trailing: trailing.map(str::to_owned),
    }
}

// ── Registration ─────────────────────────────────────────────────

/// 001–004, sent once registration completes.
pub fn welcome(nick: &str, user: &str) -> [Message; 4] {
    let version = concat!("tarn-", env!("CARGO_PKG_VERSION"));
    [
        numeric(
            "001",
            vec![nick.into()],
            Some(&format!(
                "Welcome to the Internet Relay Network {}",
                user_id(nick, user)
            )),
        ),
        numeric(
            "002",
            vec![nick.into()],
            Some(&format!(
                "Your host is {}, running version {version}",
                *SERVER_NAME
            )),
        ),
        numeric(
            "003",
            vec![nick.into()],
            Some("This server was created today"),
        ),
        numeric(
            "004",
            vec![
                nick.into(),
                SERVER_NAME.clone(),
                version.into(),
                "o".into(),
                "itkol".into(),
            ],
            None,
        ),
    ]
}

pub fn err_not_registered(nick: &str) -> Message {
    numeric("451", vec![nick.into()], Some("You have not registered"))
}

pub fn err_already_registered(nick: &str) -> Message {
    numeric("462", vec![nick.into()], Some("You may not reregister"))
}

pub fn err_passwd_mismatch(nick: &str) -> Message {
    numeric("464", vec![nick.into()], Some("Password incorrect"))
}

// ── Nicknames ────────────────────────────────────────────────────

pub fn err_no_nickname_given(nick: &str) -> Message {
    numeric("431", vec![nick.into()], Some("No nickname given"))
}

pub fn err_erroneus_nickname(nick: &str, bad: &str) -> Message {
    numeric(
        "432",
        vec![nick.into(), bad.into()],
        Some("Erroneous nickname"),
    )
}

pub fn err_nickname_in_use(nick: &str, taken: &str) -> Message {
    numeric(
        "433",
        vec![nick.into(), taken.into()],
        Some("Nickname is already in use"),
    )
}

/// `:old!user@host NICK new`, echoed on a successful rename.
pub fn nick_change(old_id: &str, new: &str) -> Message {
    relayed(old_id, "NICK", vec![new.into()], None)
}

// ── Generic command errors ───────────────────────────────────────

pub fn err_unknown_command(nick: &str, command: &str) -> Message {
    numeric(
        "421",
        vec![nick.into(), command.into()],
        Some("Unknown command"),
    )
}

pub fn err_need_more_params(nick: &str, command: &str) -> Message {
    numeric(
        "461",
        vec![nick.into(), command.into()],
        Some("Not enough parameters"),
    )
}

/// 400, used for lines the parser rejects.
pub fn err_unknown_error(nick: &str, text: &str) -> Message {
    numeric("400", vec![nick.into()], Some(text))
}

// ── Channels: joining ────────────────────────────────────────────

pub fn err_no_such_channel(nick: &str, channel: &str) -> Message {
    numeric(
        "403",
        vec![nick.into(), channel.into()],
        Some("No such channel"),
    )
}

pub fn err_not_on_channel(nick: &str, channel: &str) -> Message {
    numeric(
        "442",
        vec![nick.into(), channel.into()],
        Some("You're not on that channel"),
    )
}

pub fn err_user_on_channel(nick: &str, target: &str, channel: &str) -> Message {
    numeric(
        "443",
        vec![nick.into(), target.into(), channel.into()],
        Some("Is already on channel"),
    )
}

pub fn err_invite_only_chan(nick: &str, channel: &str) -> Message {
    numeric(
        "473",
        vec![nick.into(), channel.into()],
        Some("Cannot join channel (+i)"),
    )
}

pub fn err_bad_channel_key(nick: &str, channel: &str) -> Message {
    numeric(
        "475",
        vec![nick.into(), channel.into()],
        Some("Cannot join channel (+k)"),
    )
}

pub fn err_channel_is_full(nick: &str, channel: &str) -> Message {
    numeric(
        "471",
        vec![nick.into(), channel.into()],
        Some("Cannot join channel (+l)"),
    )
}

/// `:nick!user@host JOIN :#channel`, broadcast and echoed on join.
pub fn join(prefix: &str, channel: &str) -> Message {
    relayed(prefix, "JOIN", vec![], Some(channel))
}

/// `:nick!user@host PART #channel :reason`.
pub fn part(prefix: &str, channel: &str, reason: &str) -> Message {
    let reason = if reason.is_empty() { "." } else { reason };
    relayed(prefix, "PART", vec![channel.into()], Some(reason))
}

pub fn rpl_namreply(nick: &str, channel: &str, names: &str) -> Message {
    numeric(
        "353",
        vec![nick.into(), "=".into(), channel.into()],
        Some(names),
    )
}

pub fn rpl_endofnames(nick: &str, channel: &str) -> Message {
    numeric(
        "366",
        vec![nick.into(), channel.into()],
        Some("End of /NAMES list"),
    )
}

/// `:server MODE #channel +modes`, part of the channel-creation greeting.
pub fn channel_modes(channel: &str, modes: &str) -> Message {
    Message {
        prefix: Some(SERVER_NAME.clone()),
        command: "MODE".into(),
        params: vec![channel.into(), modes.into()],
        trailing: None,
    }
}

// ── Topic ────────────────────────────────────────────────────────

pub fn rpl_no_topic(nick: &str, channel: &str) -> Message {
    numeric(
        "331",
        vec![nick.into(), channel.into()],
        Some("No topic is set"),
    )
}

pub fn rpl_topic(nick: &str, channel: &str, topic: &str) -> Message {
    numeric("332", vec![nick.into(), channel.into()], Some(topic))
}

/// `:nick!user@host TOPIC #channel :new topic`, broadcast on change.
pub fn topic_change(prefix: &str, channel: &str, topic: &str) -> Message {
    relayed(prefix, "TOPIC", vec![channel.into()], Some(topic))
}

pub fn err_chanop_privs_needed(nick: &str, channel: &str) -> Message {
    numeric(
        "482",
        vec![nick.into(), channel.into()],
        Some("You're not channel operator"),
    )
}

// ── Modes ────────────────────────────────────────────────────────

pub fn rpl_channel_mode_is(nick: &str, channel: &str, modes: &str) -> Message {
    numeric(
        "324",
        vec![nick.into(), channel.into(), modes.into()],
        None,
    )
}

pub fn err_unknown_mode(nick: &str, mode: char) -> Message {
    numeric(
        "472",
        vec![nick.into(), mode.to_string()],
        Some("is unknown mode char to me"),
    )
}

pub fn err_invalid_mode_param(
    nick: &str,
    channel: &str,
    mode: char,
    param: &str,
    text: &str,
) -> Message {
    numeric(
        "696",
        vec![
            nick.into(),
            channel.into(),
            mode.to_string(),
            param.into(),
        ],
        Some(text),
    )
}

/// `:nick!user@host MODE #channel +i-t…`, one aggregated broadcast per
/// MODE command that changed anything.
pub fn mode_change(prefix: &str, channel: &str, modes: &str) -> Message {
    relayed(prefix, "MODE", vec![channel.into(), modes.into()], None)
}

// ── Kicks ────────────────────────────────────────────────────────

pub fn err_user_not_in_channel(nick: &str, target: &str, channel: &str) -> Message {
    numeric(
        "441",
        vec![nick.into(), target.into(), channel.into()],
        Some("They aren't on that channel"),
    )
}

pub fn err_cant_kick_self(nick: &str, channel: &str) -> Message {
    numeric(
        "482",
        vec![nick.into(), channel.into()],
        Some("You can't kick yourself"),
    )
}

/// `:nick!user@host KICK #channel target :comment`.
pub fn kick(prefix: &str, channel: &str, target: &str, comment: &str) -> Message {
    relayed(
        prefix,
        "KICK",
        vec![channel.into(), target.into()],
        Some(comment),
    )
}

// ── Invites ──────────────────────────────────────────────────────

pub fn rpl_inviting(nick: &str, target: &str, channel: &str) -> Message {
    numeric(
        "341",
        vec![nick.into(), target.into(), channel.into()],
        None,
    )
}

/// `:nick!user@host INVITE target :#channel`, delivered to the invitee.
pub fn invite(prefix: &str, target: &str, channel: &str) -> Message {
    relayed(prefix, "INVITE", vec![target.into()], Some(channel))
}

// ── Messaging ────────────────────────────────────────────────────

pub fn err_no_recipient(nick: &str) -> Message {
    numeric(
        "411",
        vec![nick.into()],
        Some("No recipient given (PRIVMSG)"),
    )
}

pub fn err_no_text_to_send(nick: &str) -> Message {
    numeric("412", vec![nick.into()], Some("No text to send"))
}

pub fn err_cannot_send_to_chan(nick: &str, channel: &str) -> Message {
    numeric(
        "404",
        vec![nick.into(), channel.into()],
        Some("Cannot send to channel"),
    )
}

pub fn err_no_such_nick(nick: &str, target: &str) -> Message {
    numeric(
        "401",
        vec![nick.into(), target.into()],
        Some("No such nick/channel"),
    )
}

/// `:nick!user@host PRIVMSG target :text` (also used for NOTICE).
pub fn privmsg(prefix: &str, command: &str, target: &str, text: &str) -> Message {
    relayed(prefix, command, vec![target.into()], Some(text))
}

// ── Misc ─────────────────────────────────────────────────────────

pub fn pong(token: &str) -> Message {
    Message {
        prefix: Some(SERVER_NAME.clone()),
        command: "PONG".into(),
        params: vec![token.into()],
        trailing: None,
    }
}

/// `:nick!user@host QUIT :Quit: reason`, broadcast to co-channel members.
pub fn quit(prefix: &str, reason: &str) -> Message {
    relayed(
        prefix,
        "QUIT",
        vec![],
        Some(&format!("Quit: {reason}")),
    )
}

/// Empty-capability answer to `CAP LS`.
pub fn cap_ls(nick: &str) -> Message {
    Message {
        prefix: Some(SERVER_NAME.clone()),
        command: "CAP".into(),
        params: vec![nick.into(), "LS".into()],
        trailing: Some(String::new()),
    }
}
