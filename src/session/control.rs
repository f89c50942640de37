//! Control connection loop
//!
//! Reads command lines, applies the busy and sequencing checks, dispatches
//! to the verb handlers and writes replies. Final transfer replies arrive on
//! a channel and are written as soon as they are queued, always ahead of the
//! reply to the command being processed.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::commands;
use crate::error::{CodecError, CommandError, FtpError, SessionError, TlsError};
use crate::protocol::codec::ControlCodec;
use crate::protocol::commands::{Command, parse_command};
use crate::protocol::responses::{Reply, ReplyCode};
use crate::protocol::sequencer::validate;
use crate::server::context::ServerContext;
use crate::session::state::{ExitReason, SecurityChange, Session};
use crate::tls::SecureStream;

pub type ControlChannel = Framed<SecureStream, ControlCodec>;

enum Flow {
    Continue,
    Close,
    Secure(SecurityChange),
}

/// Runs a session from greeting to teardown.
pub async fn run(
    mut session: Session,
    framed: ControlChannel,
    mut transfer_replies: mpsc::UnboundedReceiver<Reply>,
) {
    let ctx = Arc::clone(&session.ctx);
    let mut framed = framed;

    let channel = if greet(&mut session, &mut framed).await {
        drive(&mut session, framed, &mut transfer_replies).await
    } else {
        Some(framed)
    };

    teardown(&mut session, &ctx, channel).await;
}

fn transport_error(err: CodecError) -> SessionError {
    match err {
        CodecError::Io(e) => SessionError::Transport(e),
        other => SessionError::Codec(other),
    }
}

async fn write(framed: &mut ControlChannel, reply: Reply) -> Result<(), SessionError> {
    framed.send(reply).await.map_err(transport_error)
}

/// Writes every transfer reply queued so far.
async fn flush_transfer_replies(
    framed: &mut ControlChannel,
    transfer_replies: &mut mpsc::UnboundedReceiver<Reply>,
) -> Result<(), SessionError> {
    while let Ok(reply) = transfer_replies.try_recv() {
        write(framed, reply).await?;
    }
    Ok(())
}

/// Executes the synthetic connection command. Returns false when the session
/// must close without reading any command.
async fn greet(session: &mut Session, framed: &mut ControlChannel) -> bool {
    let ctx = Arc::clone(&session.ctx);

    if ctx.shutdown.is_cancelled() {
        session.set_exit(ExitReason::Shutdown);
        let reply = Reply::new(ReplyCode::ServiceNotAvailable, "Server shutting down");
        let _ = write(framed, reply).await;
        return false;
    }

    session.current = Command::connection();
    session.previous = Command::connection();
    let reply = match ctx.hooks.after_connect(&session.info()).await {
        Ok(()) => Reply::new(ReplyCode::ServiceReady, "Welcome to RAX FTP Server"),
        Err(e) => e.to_reply(),
    };
    let refused = reply.code().is_terminating();
    let message = reply.message().to_string();

    if let Err(e) = write(framed, reply).await {
        session.set_exit(ExitReason::Transport(e.to_string()));
        return false;
    }
    if refused {
        session.set_exit(ExitReason::Refused(message));
        return false;
    }
    session.ready = true;
    true
}

/// Main read/dispatch loop. Returns the channel unless it was lost in a
/// failed security change.
async fn drive(
    session: &mut Session,
    mut framed: ControlChannel,
    transfer_replies: &mut mpsc::UnboundedReceiver<Reply>,
) -> Option<ControlChannel> {
    let ctx = Arc::clone(&session.ctx);

    loop {
        tokio::select! {
            biased;

            _ = ctx.shutdown.cancelled() => {
                session.set_exit(ExitReason::Shutdown);
                let _ = flush_transfer_replies(&mut framed, transfer_replies).await;
                let reply = Reply::new(ReplyCode::ServiceNotAvailable, "Server shutting down");
                let _ = write(&mut framed, reply).await;
                return Some(framed);
            }

            Some(reply) = transfer_replies.recv() => {
                if let Err(e) = write(&mut framed, reply).await {
                    session.set_exit(ExitReason::Transport(e.to_string()));
                    return Some(framed);
                }
            }

            frame = framed.next() => {
                let line = match frame {
                    None => {
                        session.set_exit(ExitReason::ClientClosed);
                        return Some(framed);
                    }
                    Some(Err(CodecError::LineTooLong(limit))) => {
                        warn!("Session {} sent a command longer than {limit} bytes", session.id);
                        let reply = Reply::new(ReplyCode::CommandSyntaxError, "Command line too long");
                        let _ = write(&mut framed, reply).await;
                        session.set_exit(ExitReason::Protocol("command line too long".into()));
                        return Some(framed);
                    }
                    Some(Err(CodecError::Io(e))) => {
                        session.set_exit(ExitReason::Transport(e.to_string()));
                        return Some(framed);
                    }
                    Some(Ok(line)) => line,
                };

                match handle_line(session, &mut framed, transfer_replies, &line).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Close) => return Some(framed),
                    Ok(Flow::Secure(change)) => match splice(framed, change, &ctx).await {
                        Ok(secured) => {
                            framed = secured;
                            session.secure = change == SecurityChange::Upgrade;
                            info!(
                                "Session {} control channel is now {}",
                                session.id,
                                if session.secure { "secure" } else { "clear" }
                            );
                        }
                        Err(e) => {
                            warn!("Session {} security change failed: {e}", session.id);
                            session.set_exit(ExitReason::Protocol(e.to_string()));
                            return None;
                        }
                    },
                    Err(e) => {
                        fail(session, &mut framed, e).await;
                        return Some(framed);
                    }
                }
            }
        }
    }
}

async fn handle_line(
    session: &mut Session,
    framed: &mut ControlChannel,
    transfer_replies: &mut mpsc::UnboundedReceiver<Reply>,
    line: &str,
) -> Result<Flow, SessionError> {
    let ctx = Arc::clone(&session.ctx);
    let command = parse_command(line);

    if !session.ready {
        write(
            framed,
            Reply::new(ReplyCode::ServiceNotAvailable, "Service not available"),
        )
        .await?;
        session.set_exit(ExitReason::Shutdown);
        return Ok(Flow::Close);
    }

    if !command.code.is_special() && session.executor.is_busy() {
        debug!("Session {} busy, refusing {command}", session.id);
        flush_transfer_replies(framed, transfer_replies).await?;
        write(
            framed,
            Reply::new(ReplyCode::BadCommandSequence, "Previous transfer not finished"),
        )
        .await?;
        return Ok(Flow::Continue);
    }

    let command = if command.code.is_special() || command.code.is_security() {
        command
    } else {
        let extra_next = session.extra_next.take();
        if validate(session.previous.descriptor(), command.descriptor(), extra_next) {
            command
        } else {
            debug!(
                "Session {} rejected {} after {}",
                session.id, command.verb, session.previous.verb
            );
            Command::incorrect_sequence(&command)
        }
    };
    session.current = command.clone();

    let outcome = match ctx.hooks.before_command(&session.info(), &command).await {
        Ok(()) => commands::dispatch(session, &command).await,
        Err(e) => Err(CommandError::Reply(e)),
    };
    if !command.code.is_special() {
        session.previous = command.clone();
    }

    let info = session.info();
    let reply = match outcome {
        Ok(reply) => {
            ctx.hooks.after_command_ok(&info, &command, &reply).await;
            reply
        }
        Err(CommandError::Reply(e)) => {
            ctx.hooks.after_command_error(&info, &command, &e).await;
            e.to_reply()
        }
        Err(CommandError::Fatal(e)) => return Err(e),
    };

    flush_transfer_replies(framed, transfer_replies).await?;
    let code = reply.code();
    let message = reply.message().to_string();
    write(framed, reply).await?;

    if code.is_terminating() {
        session.set_exit(if code == ReplyCode::ClosingControlConnection {
            ExitReason::Quit
        } else {
            ExitReason::Refused(message)
        });
        return Ok(Flow::Close);
    }

    if let Some(transfer) = session.pending_transfer.take() {
        if let Err(e) = session
            .executor
            .start(transfer, session.data.connector(), session.info())
        {
            warn!("Session {} could not start transfer: {e}", session.id);
            let reply = FtpError::from(e).to_reply();
            write(framed, reply).await?;
        }
    }

    Ok(match session.security_change.take() {
        Some(change) => Flow::Secure(change),
        None => Flow::Continue,
    })
}

/// Swaps the transport under the control channel once the reply announcing
/// the change has been flushed.
async fn splice(
    framed: ControlChannel,
    change: SecurityChange,
    ctx: &ServerContext,
) -> Result<ControlChannel, SessionError> {
    let parts = framed.into_parts();
    if !parts.read_buf.is_empty() {
        return Err(TlsError::BufferedPlaintext.into());
    }
    let codec = parts.codec;
    let stream = match change {
        SecurityChange::Upgrade => {
            let acceptor = ctx.tls.as_ref().ok_or(TlsError::NotConfigured)?;
            parts.io.upgrade(acceptor).await?
        }
        SecurityChange::Downgrade => parts.io.downgrade().await?,
    };
    Ok(Framed::new(stream, codec))
}

/// Tier-2 and tier-3 failures end the session.
async fn fail(session: &mut Session, framed: &mut ControlChannel, err: SessionError) {
    if err.is_internal() {
        error!("Session {} internal error: {err}", session.id);
        session.set_exit(ExitReason::Internal(err.to_string()));
        let ctx = Arc::clone(&session.ctx);
        ctx.hooks.on_local_exception(&session.info(), &err).await;
        let reply = Reply::new(ReplyCode::ServiceNotAvailable, "Local error, closing connection");
        let _ = write(framed, reply).await;
    } else {
        warn!("Session {} transport error: {err}", session.id);
        session.set_exit(ExitReason::Transport(err.to_string()));
    }
}

async fn teardown(session: &mut Session, ctx: &ServerContext, channel: Option<ControlChannel>) {
    session.ready = false;
    if !session.executor.wait_idle(ctx.startup.close_wait()).await {
        debug!("Session {} transfer still running at close, aborting", session.id);
    }
    session.executor.clear().await;
    session.data.clear().await;

    let reason = session.exit.clone().unwrap_or(ExitReason::ClientClosed);
    ctx.hooks.on_closed(&session.info(), &reason).await;

    if let Some(framed) = channel {
        framed.into_inner().shutdown_quietly().await;
    }
}
