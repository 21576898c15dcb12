// Command pipeline: many producers, one dispatcher
//
// Front-ends push raw text lines onto an unbounded queue. A single dispatcher
// task parses them and drives the device session one command at a time, in
// arrival order. A `quit` line (or end of input on the text front-end)
// triggers the shared shutdown token, which stops producers and dispatcher.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// local imports
use crate::command::{Command, parse};
use crate::device::{Bus, Session, SessionError};
use crate::messages::Outcome;

/// Cooperative cancellation shared by every task of the pipeline
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `trigger` has been called (immediately if it already was)
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|&triggered| triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Terminated,
}

/// Single consumer of the command queue
pub struct Dispatcher<B> {
    session: Arc<Session<B>>,
    commands: mpsc::UnboundedReceiver<String>,
    shutdown: Shutdown,
    state: DispatcherState,
}

impl<B: Bus + 'static> Dispatcher<B> {
    pub fn new(
        session: Arc<Session<B>>,
        commands: mpsc::UnboundedReceiver<String>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            session,
            commands,
            shutdown,
            state: DispatcherState::Running, // Running until quit or shutdown
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Process queued commands until quit, shutdown, or every producer is gone
    pub async fn run(mut self) -> DispatcherState {
        info!("Dispatcher started");

        while self.state == DispatcherState::Running {
            tokio::select! {
                // Queued commands go first so shutdown never skips them
                biased;

                line = self.commands.recv() => match line {
                    Some(line) => self.on_line(&line).await,
                    None => {
                        info!("Command queue closed");
                        self.state = DispatcherState::Terminated;
                    }
                },
                _ = self.shutdown.wait() => {
                    self.drain().await;
                    self.state = DispatcherState::Terminated;
                }
            }
        }

        info!("Dispatcher terminated");
        self.state
    }

    /// Execute whatever is still queued after shutdown was observed
    async fn drain(&mut self) {
        while self.state == DispatcherState::Running {
            match self.commands.try_recv() {
                Ok(line) => self.on_line(&line).await,
                Err(_) => break,
            }
        }
    }

    /// Handle one text line
    async fn on_line(&mut self, line: &str) {
        let command = match parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        debug!("Dispatching {:?}", command);

        match command {
            Command::Quit => {
                info!("Quit received, shutting down");
                self.shutdown.trigger();
                self.state = DispatcherState::Terminated;
            }
            // Stalls every command queued behind it
            Command::Sleep(duration) => tokio::time::sleep(duration).await,
            command => match self.execute(command).await {
                Ok(Outcome::Voltage(volts)) => println!("battery voltage: {}", volts),
                Ok(Outcome::Done) => {}
                Err(e) => error!("Error executing command {:?}: {}", line, e),
            },
        }
    }

    /// Run a device command on the blocking pool and wait for it
    async fn execute(&self, command: Command) -> Result<Outcome, SessionError> {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || apply(&session, command))
            .await
            .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))
    }
}

/// Map a parsed command onto the device session
pub fn apply<B: Bus>(session: &Session<B>, command: Command) -> Result<Outcome, SessionError> {
    match command {
        Command::Forward { cm } => session.move_forward(cm as f64)?,
        Command::Backward { cm } => session.move_backward(cm as f64)?,
        Command::Stop => session.stop()?,
        Command::Left => session.left()?,
        Command::LeftRotate => session.left_rotate()?,
        Command::Right => session.right()?,
        Command::RightRotate => session.right_rotate()?,
        Command::TurnLeft { degrees } => session.turn_left(degrees)?,
        Command::TurnRight { degrees } => session.turn_right(degrees)?,
        Command::Volt => return Ok(Outcome::Voltage(session.battery_voltage()?)),
        // Handled by the dispatcher itself
        Command::Sleep(_) | Command::Quit => {}
    }
    Ok(Outcome::Done)
}

/// Start a dispatcher over `session` and return the producer side of its queue
pub fn spawn_dispatcher<B: Bus + 'static>(
    session: Arc<Session<B>>,
    shutdown: Shutdown,
) -> (mpsc::UnboundedSender<String>, JoinHandle<DispatcherState>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(session, rx, shutdown);
    (tx, tokio::spawn(dispatcher.run()))
}

/// Text producer: enqueue one command per line.
///
/// Stops after forwarding a `quit` line. End of input or a read error
/// triggers shutdown so the dispatcher finishes what is queued and exits.
pub async fn read_commands<R>(reader: R, commands: mpsc::UnboundedSender<String>, shutdown: Shutdown)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.wait() => {
                debug!("Reader stopping on shutdown");
                return;
            }
        };

        match line {
            Ok(Some(line)) => {
                let quit = matches!(parse(&line), Ok(Command::Quit));
                if commands.send(line).is_err() {
                    warn!("Dispatcher is gone, dropping input");
                    return;
                }
                if quit {
                    return;
                }
            }
            Ok(None) => {
                info!("End of input");
                break;
            }
            Err(e) => {
                error!("Error reading commands: {}", e);
                break;
            }
        }
    }
    shutdown.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockBus;
    use std::time::Duration;

    fn setup() -> (Arc<Session<MockBus>>, MockBus) {
        let bus = MockBus::new();
        (Arc::new(Session::new(bus.clone())), bus)
    }

    fn opcodes(bus: &MockBus) -> Vec<u8> {
        bus.writes().iter().map(|w| w[0]).collect()
    }

    #[tokio::test]
    async fn test_commands_run_in_order_until_quit() {
        let (session, bus) = setup();
        let shutdown = Shutdown::new();
        let (tx, handle) = spawn_dispatcher(session, shutdown.clone());

        for line in ["f 10", "s", "quit", "l"] {
            tx.send(line.to_string()).unwrap();
        }

        assert_eq!(handle.await.unwrap(), DispatcherState::Terminated);
        assert!(shutdown.is_triggered());
        // Target for 10 cm, forward, stop; nothing after quit
        assert_eq!(
            bus.writes(),
            vec![vec![50, 3, 0, 9], vec![105, 0, 0, 0], vec![120, 0, 0, 0]]
        );
    }

    #[tokio::test]
    async fn test_invalid_input_keeps_running() {
        let (session, bus) = setup();
        let (tx, handle) = spawn_dispatcher(session, Shutdown::new());

        for line in ["xyz", "", "s", "quit"] {
            tx.send(line.to_string()).unwrap();
        }

        assert_eq!(handle.await.unwrap(), DispatcherState::Terminated);
        assert_eq!(opcodes(&bus), vec![120]);
    }

    #[tokio::test]
    async fn test_failed_command_does_not_stop_dispatcher() {
        let (session, bus) = setup();
        bus.fail_opcode(120);
        let (tx, handle) = spawn_dispatcher(session, Shutdown::new());

        for line in ["s", "r", "quit"] {
            tx.send(line.to_string()).unwrap();
        }

        handle.await.unwrap();
        assert_eq!(opcodes(&bus), vec![100]);
    }

    #[tokio::test]
    async fn test_volt_reads_reply() {
        let (session, bus) = setup();
        bus.queue_reply(&[2, 10]);
        let (tx, handle) = spawn_dispatcher(session, Shutdown::new());

        tx.send("volt".to_string()).unwrap();
        tx.send("quit".to_string()).unwrap();

        handle.await.unwrap();
        assert_eq!(bus.events().len(), 3); // write + two reads
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let (session, bus) = setup();
        let shutdown = Shutdown::new();
        let (tx, handle) = spawn_dispatcher(session, shutdown.clone());

        tx.send("l".to_string()).unwrap();
        tx.send("r".to_string()).unwrap();
        shutdown.trigger();

        assert_eq!(handle.await.unwrap(), DispatcherState::Terminated);
        assert_eq!(opcodes(&bus), vec![97, 100]);
    }

    #[tokio::test]
    async fn test_closed_queue_terminates() {
        let (session, _bus) = setup();
        let (tx, handle) = spawn_dispatcher(session, Shutdown::new());
        drop(tx);
        assert_eq!(handle.await.unwrap(), DispatcherState::Terminated);
    }

    #[tokio::test]
    async fn test_reader_end_of_input_triggers_shutdown() {
        let (session, bus) = setup();
        let shutdown = Shutdown::new();
        let (tx, handle) = spawn_dispatcher(session, shutdown.clone());

        read_commands(&b"f 0\nb 0\n"[..], tx, shutdown.clone()).await;

        assert!(shutdown.is_triggered());
        handle.await.unwrap();
        assert_eq!(opcodes(&bus), vec![105, 107]);
    }

    #[tokio::test]
    async fn test_reader_stops_after_quit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();

        read_commands(&b"s\nquit\nf 10\n"[..], tx, shutdown.clone()).await;

        assert_eq!(rx.recv().await.as_deref(), Some("s"));
        assert_eq!(rx.recv().await.as_deref(), Some("quit"));
        // Sender dropped by the reader after quit
        assert_eq!(rx.recv().await, None);
        // The dispatcher owns the quit transition
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_reader_stops_on_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        // A reader that never yields a line must still return
        let (_client, server) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(server);
        tokio::time::timeout(Duration::from_secs(1), read_commands(reader, tx, shutdown))
            .await
            .expect("reader did not stop");
    }

    #[tokio::test]
    async fn test_shutdown_wait_after_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_apply_maps_commands() {
        let (session, bus) = setup();
        apply(&session, Command::LeftRotate).unwrap();
        apply(&session, Command::RightRotate).unwrap();
        apply(&session, Command::TurnRight { degrees: 0.0 }).unwrap();
        apply(&session, Command::Sleep(Duration::from_secs(5))).unwrap();
        assert_eq!(opcodes(&bus), vec![98, 110, 100]);
    }
}
