//! Botzone "simple interaction" subprocess bots
//!
//! Each move spawns the bot executable afresh. The full game so far is sent
//! as one JSON line on stdin:
//!
//! ```text
//! {"requests": [<opponent moves>], "responses": [<own moves>]}
//! ```
//!
//! `requests` always has one more entry than `responses`. When the bot
//! opens the game its first request is the sentinel `{"x": -1, "y": -1}`.
//! The bot answers with a single JSON line `{"response": <move>}`.

use engine_core::{Game, Player};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Interval between exit checks once the reply has arrived
const EXIT_POLL: Duration = Duration::from_millis(5);

/// Request body written to the bot's stdin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotzoneRequest {
    pub requests: Vec<Value>,
    pub responses: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct BotzoneReply<A> {
    response: A,
}

/// External engine speaking the Botzone protocol.
pub struct BotzoneBot<G: Game> {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game> std::fmt::Debug for BotzoneBot<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotzoneBot")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<G: Game> BotzoneBot<G> {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            _game: PhantomData,
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Ask the bot for its move in `state`.
    ///
    /// Every failure (spawn, write, timeout, exit status, malformed or
    /// illegal reply) is reported as a message; the caller wraps it. The
    /// whole exchange is bounded by the timeout: a bot still running at the
    /// deadline after replying is killed and its reply kept.
    pub fn request_move(&self, game: &G, state: &G::State) -> Result<G::Action, String> {
        let request = build_request(game, state).map_err(|e| format!("encode request: {}", e))?;
        let line = serde_json::to_string(&request).map_err(|e| format!("encode request: {}", e))?;
        trace!(program = %self.program.display(), %line, "Botzone request");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("spawn {}: {}", self.program.display(), e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A bot that never reads its input closes the pipe early
            if let Err(e) = writeln!(stdin, "{}", line) {
                if e.kind() != ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("write request: {}", e));
                }
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "stdout not captured".to_string())?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut first = String::new();
            let result = loop {
                first.clear();
                match reader.read_line(&mut first) {
                    Ok(0) => break Ok(String::new()),
                    Ok(_) if first.trim().is_empty() => continue,
                    Ok(_) => break Ok(first.trim().to_string()),
                    Err(e) => break Err(e.to_string()),
                }
            };
            let _ = tx.send(result);
        });

        let deadline = Instant::now() + self.timeout;
        let reply = match rx.recv_timeout(self.timeout) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("read reply: {}", e));
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("no reply within {:?}", self.timeout));
            }
        };

        // The reply is in hand; a bot that lingers past the deadline is killed
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => break,
                Ok(Some(status)) => return Err(format!("exited with {}", status)),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!(program = %self.program.display(), "Bot still running after reply, killed");
                    break;
                }
                Ok(None) => thread::sleep(EXIT_POLL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("wait: {}", e));
                }
            }
        }
        debug!(program = %self.program.display(), %reply, "Botzone reply");

        let reply: BotzoneReply<G::Action> =
            serde_json::from_str(&reply).map_err(|e| format!("malformed reply {:?}: {}", reply, e))?;
        if !game.is_legal(state, reply.response) {
            return Err(format!("illegal move {:?}", reply.response));
        }
        Ok(reply.response)
    }
}

/// Build the Botzone request for the player to move in `state`.
pub fn build_request<G: Game>(game: &G, state: &G::State) -> serde_json::Result<BotzoneRequest> {
    let me = game.current_player(state);
    let mut requests = Vec::new();
    let mut responses = Vec::new();

    if me == Player::First {
        requests.push(json!({"x": -1, "y": -1}));
    }
    // History alternates starting with the first player
    for (ply, action) in game.history(state).iter().enumerate() {
        let mover = if ply % 2 == 0 {
            Player::First
        } else {
            Player::Second
        };
        let value = serde_json::to_value(action)?;
        if mover == me {
            responses.push(value);
        } else {
            requests.push(value);
        }
    }

    Ok(BotzoneRequest {
        requests,
        responses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_gomoku::{Gomoku, Position};

    fn play(game: &Gomoku, moves: &[(i32, i32)]) -> games_gomoku::Board {
        moves.iter().fold(game.initial_state(), |s, &(x, y)| {
            game.apply(&s, Position::new(x, y)).unwrap()
        })
    }

    fn shell_bot(script: &str, timeout_ms: u64) -> BotzoneBot<Gomoku> {
        BotzoneBot::new(
            "/bin/sh",
            vec!["-c".into(), script.into()],
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_request_when_bot_opens() {
        let game = Gomoku::standard();
        let request = build_request(&game, &game.initial_state()).unwrap();
        assert_eq!(request.requests, vec![json!({"x": -1, "y": -1})]);
        assert!(request.responses.is_empty());
    }

    #[test]
    fn test_request_alternates_moves() {
        let game = Gomoku::standard();

        // Second player to move after one stone
        let state = play(&game, &[(7, 7)]);
        let request = build_request(&game, &state).unwrap();
        assert_eq!(request.requests, vec![json!({"x": 7, "y": 7})]);
        assert!(request.responses.is_empty());

        // First player to move after two stones
        let state = play(&game, &[(7, 7), (8, 8)]);
        let request = build_request(&game, &state).unwrap();
        assert_eq!(
            request.requests,
            vec![json!({"x": -1, "y": -1}), json!({"x": 8, "y": 8})]
        );
        assert_eq!(request.responses, vec![json!({"x": 7, "y": 7})]);
        assert_eq!(request.requests.len(), request.responses.len() + 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_bot_reply_is_parsed() {
        let game = Gomoku::standard();
        let bot = shell_bot(
            r#"cat >/dev/null; echo '{"response": {"x": 3, "y": 4}}'"#,
            5000,
        );
        let action = bot.request_move(&game, &game.initial_state()).unwrap();
        assert_eq!(action, Position::new(3, 4));
    }

    #[cfg(unix)]
    #[test]
    fn test_bot_timeout_is_an_error() {
        let game = Gomoku::standard();
        let bot = shell_bot("sleep 5", 200);
        let err = bot.request_move(&game, &game.initial_state()).unwrap_err();
        assert!(err.contains("no reply"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn test_bot_lingering_after_reply_is_killed() {
        let game = Gomoku::standard();
        let bot = shell_bot(
            r#"cat >/dev/null; echo '{"response": {"x": 1, "y": 1}}'; sleep 6"#,
            500,
        );
        let start = Instant::now();
        let action = bot.request_move(&game, &game.initial_state()).unwrap();
        assert_eq!(action, Position::new(1, 1));
        assert!(start.elapsed() < Duration::from_secs(3), "{:?}", start.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn test_bot_malformed_reply_is_an_error() {
        let game = Gomoku::standard();
        let bot = shell_bot("cat >/dev/null; echo 'pass'", 5000);
        let err = bot.request_move(&game, &game.initial_state()).unwrap_err();
        assert!(err.contains("malformed"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn test_bot_illegal_move_is_an_error() {
        let game = Gomoku::standard();
        let state = play(&game, &[(0, 0)]);
        let bot = shell_bot(
            r#"cat >/dev/null; echo '{"response": {"x": 0, "y": 0}}'"#,
            5000,
        );
        let err = bot.request_move(&game, &state).unwrap_err();
        assert!(err.contains("illegal"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn test_bot_nonzero_exit_is_an_error() {
        let game = Gomoku::standard();
        let bot = shell_bot(
            r#"cat >/dev/null; echo '{"response": {"x": 1, "y": 1}}'; exit 3"#,
            5000,
        );
        assert!(bot.request_move(&game, &game.initial_state()).is_err());
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let game = Gomoku::standard();
        let bot: BotzoneBot<Gomoku> =
            BotzoneBot::new("/nonexistent/bot", Vec::new(), Duration::from_secs(1));
        let err = bot.request_move(&game, &game.initial_state()).unwrap_err();
        assert!(err.contains("spawn"), "{}", err);
    }
}
