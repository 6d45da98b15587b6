use agent::{Agent, BoxFuture, ExitCause};
use chatclient::ChatClient;
use wireproto::{Packet, Payload};

/// State owned by the nick-and-auth agent's own mailbox: everything here is
/// touched only from within [`on_packet`] or the `set_*` mailbox thunks, so
/// no locking is needed even though both the client's listener dispatch and
/// public callers reach it through `cast`/`call`.
pub struct NickAndAuthState {
    pub(crate) client: ChatClient,
    pub(crate) desired_nick: String,
    pub(crate) current_nick: Option<String>,
    pub(crate) own_session_id: Option<String>,
    pub(crate) passcode: Option<String>,
    pub(crate) authorized: bool,
    pub(crate) nick_failed: bool,
    pub(crate) auth_failed: bool,
}

impl NickAndAuthState {
    pub(crate) fn new(client: ChatClient, desired_nick: String) -> Self {
        NickAndAuthState {
            client,
            desired_nick,
            current_nick: None,
            own_session_id: None,
            passcode: None,
            authorized: false,
            nick_failed: false,
            auth_failed: false,
        }
    }
}

fn nick_is_desired(state: &NickAndAuthState) -> bool {
    state.current_nick.as_deref() == Some(state.desired_nick.as_str())
}

/// Sends the desired-nick command if, and only if, the current nick doesn't
/// already match, the room is authorized, and the last attempt (if any)
/// didn't already fail. Run inline rather than as a concurrent task: the
/// reply comes back through the client's own reply-correlation path, not
/// through this agent's listener feed, so awaiting it here can't deadlock
/// the mailbox. Returns the error (if any) from the most recent attempt;
/// `None` covers both "already matches" and "nothing to do yet"
/// (unauthorized, or a prior attempt already failed and is waiting on a
/// fresh `set_desired_nick`).
async fn maybe_send_nick(state: &mut NickAndAuthState) -> Option<String> {
    if nick_is_desired(state) || !state.authorized || state.nick_failed {
        return None;
    }
    let desired = state.desired_nick.clone();
    match state.client.send_nick(desired).await {
        Ok(reply) => match reply.payload() {
            Ok(payload) => match payload.as_nick() {
                Some(nick) => {
                    state.current_nick = Some(nick.to.clone());
                    None
                }
                None => {
                    let msg = format!("nick command got an unexpected reply of kind `{}`", reply.kind);
                    tracing::debug!("{msg}");
                    state.nick_failed = true;
                    Some(msg)
                }
            },
            Err(e) => {
                tracing::debug!("nick command got an error response: {e}");
                state.nick_failed = true;
                Some(e.to_string())
            }
        },
        Err(e) => {
            tracing::warn!("nick request failed: {e}");
            state.nick_failed = true;
            Some(e.to_string())
        }
    }
}

/// Shared by the `BounceEvent` reaction and `set_passcode`: attempts auth
/// with whatever passcode is currently configured, then re-attempts the
/// desired nick on success. Returns the error (if any).
async fn maybe_send_auth(state: &mut NickAndAuthState) -> Option<String> {
    if state.authorized || state.auth_failed {
        return None;
    }
    let Some(passcode) = state.passcode.clone() else {
        tracing::info!("passcode required to authenticate but none configured");
        state.auth_failed = true;
        return Some("no passcode configured".to_string());
    };
    match state.client.send_auth(passcode).await {
        Ok(reply) => match reply.payload() {
            Ok(payload) => match payload.as_auth_reply() {
                Some(auth_reply) if auth_reply.success => {
                    state.authorized = true;
                    maybe_send_nick(state).await;
                    None
                }
                Some(auth_reply) => {
                    let msg = auth_reply
                        .reason
                        .clone()
                        .unwrap_or_else(|| "authentication failed".to_string());
                    tracing::info!(reason = %msg, "authentication failed");
                    state.auth_failed = true;
                    Some(msg)
                }
                None => {
                    let msg = format!("auth command got an unexpected reply of kind `{}`", reply.kind);
                    tracing::debug!("{msg}");
                    state.auth_failed = true;
                    Some(msg)
                }
            },
            Err(e) => {
                tracing::debug!("auth command got an error response: {e}");
                state.auth_failed = true;
                Some(e.to_string())
            }
        },
        Err(e) => {
            tracing::warn!("auth request failed: {e}");
            state.auth_failed = true;
            Some(e.to_string())
        }
    }
}

/// Dispatches one inbound packet. Registered as the client listener handler
/// for the lifetime of the agent.
pub(crate) fn dispatch_packet(state: &mut NickAndAuthState, packet: Packet) -> BoxFuture<'_, ()> {
    Box::pin(on_packet(state, packet))
}

async fn on_packet(state: &mut NickAndAuthState, packet: Packet) {
    match packet.payload() {
        Ok(Payload::Hello(hello)) => {
            state.current_nick = Some(hello.session.name.clone());
            state.own_session_id = Some(hello.session.session_id.clone());
            state.authorized = !hello.room_is_private;
            maybe_send_nick(state).await;
        }
        Ok(Payload::Bounce(bounce)) => {
            if state.authorized {
                state.authorized = false;
                return;
            }
            if state.auth_failed {
                return;
            }
            if !bounce.auth_options().iter().any(|opt| opt == "passcode") {
                tracing::error!("server offered no passcode auth method");
                state.auth_failed = true;
                return;
            }
            maybe_send_auth(state).await;
        }
        // Our own nick commands are already resolved through the direct
        // reply awaited in `maybe_send_nick`/`maybe_send_auth`. This also
        // catches a nick-event broadcast when *we* are the one who changed,
        // which the server sends to everyone in the room (ourselves
        // included) independently of the correlated nick-reply.
        Ok(Payload::NickEvent(nick)) | Ok(Payload::NickReply(nick)) => {
            if state.own_session_id.as_deref() == Some(nick.session_id.as_str()) {
                state.current_nick = Some(nick.to.clone());
            }
        }
        _ => {}
    }
}

pub(crate) fn set_desired_nick_thunk(
    new_nick: String,
) -> impl for<'a> FnOnce(&'a mut NickAndAuthState) -> BoxFuture<'a, Option<String>> {
    move |state: &mut NickAndAuthState| {
        Box::pin(async move {
            if state.desired_nick == new_nick {
                return None;
            }
            state.desired_nick = new_nick;
            state.nick_failed = false;
            maybe_send_nick(state).await
        })
    }
}

/// Updates the passcode and, if the room isn't currently authorized,
/// attempts auth with it (and, on success, re-attempts the desired nick).
pub(crate) fn set_passcode_thunk(
    new_passcode: String,
) -> impl for<'a> FnOnce(&'a mut NickAndAuthState) -> BoxFuture<'a, Option<String>> {
    move |state: &mut NickAndAuthState| {
        Box::pin(async move {
            state.passcode = Some(new_passcode);
            state.auth_failed = false;
            maybe_send_auth(state).await
        })
    }
}

pub(crate) fn exit_with(agent: &Agent<NickAndAuthState>, cause: Option<ExitCause>) {
    agent.exit(cause);
}
