#![forbid(unsafe_code)]

use async_trait::async_trait;
use ports::{
    DetailResolver, Phase, ProcessControl, ProcessDetails, ProcessRecord, SignalError, StopSignal,
    Supervisor, TerminationOutcome, TerminationSettings, Terminator,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const CALLER: u32 = 1000;
const OWN_GROUP: u32 = 77;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sent {
    Process(u32, StopSignal),
    Group(u32, StopSignal),
}

#[derive(Debug, Clone)]
struct FakeProcess {
    pgid: Option<u32>,
    members: usize,
    owner: u32,
    state: char,
    /// The weakest signal that ends the process; `None` survives everything.
    dies_on: Option<StopSignal>,
    died_at: Option<Instant>,
    respawned_by: Option<Supervisor>,
}

impl FakeProcess {
    fn new(pgid: u32) -> Self {
        Self {
            pgid: Some(pgid),
            members: 1,
            owner: CALLER,
            state: 'S',
            dies_on: Some(StopSignal::Graceful),
            died_at: None,
            respawned_by: None,
        }
    }

    fn alive(&self) -> bool {
        match self.died_at {
            None => true,
            // supervisors bring the process back shortly after it died
            Some(died) => {
                self.respawned_by.is_some()
                    && Instant::now() >= died + Duration::from_millis(300)
            }
        }
    }

    fn receive(&mut self, signal: StopSignal) {
        let dies = match self.dies_on {
            Some(StopSignal::Graceful) => true,
            Some(StopSignal::Force) => signal == StopSignal::Force,
            None => false,
        };
        if dies && self.died_at.is_none() {
            self.died_at = Some(Instant::now());
        }
    }
}

#[derive(Default)]
struct FakeSystem {
    processes: Mutex<HashMap<u32, FakeProcess>>,
    sent: Mutex<Vec<Sent>>,
}

impl FakeSystem {
    fn with(processes: impl IntoIterator<Item = (u32, FakeProcess)>) -> Arc<Self> {
        Arc::new(Self {
            processes: Mutex::new(processes.into_iter().collect()),
            sent: Mutex::default(),
        })
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessControl for FakeSystem {
    async fn is_alive(&self, pid: u32) -> bool {
        self.processes
            .lock()
            .unwrap()
            .get(&pid)
            .is_some_and(FakeProcess::alive)
    }

    async fn process_group(&self, pid: u32) -> Option<u32> {
        self.processes.lock().unwrap().get(&pid)?.pgid
    }

    fn own_group(&self) -> Option<u32> {
        Some(OWN_GROUP)
    }

    async fn group_size(&self, pgid: u32) -> Option<usize> {
        let processes = self.processes.lock().unwrap();
        let members = processes
            .values()
            .filter(|p| p.pgid == Some(pgid))
            .map(|p| p.members)
            .sum();
        Some(members)
    }

    async fn group_alive(&self, pgid: u32) -> bool {
        self.processes
            .lock()
            .unwrap()
            .values()
            .any(|p| p.pgid == Some(pgid) && p.alive())
    }

    async fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), SignalError> {
        self.sent.lock().unwrap().push(Sent::Process(pid, signal));
        let mut processes = self.processes.lock().unwrap();
        let process = processes.get_mut(&pid).ok_or(SignalError::Gone)?;
        process.receive(signal);
        Ok(())
    }

    async fn signal_group(&self, pgid: u32, signal: StopSignal) -> Result<(), SignalError> {
        self.sent.lock().unwrap().push(Sent::Group(pgid, signal));
        let mut processes = self.processes.lock().unwrap();
        let mut found = false;
        for process in processes.values_mut().filter(|p| p.pgid == Some(pgid)) {
            process.receive(signal);
            found = true;
        }
        if found { Ok(()) } else { Err(SignalError::Gone) }
    }

    async fn owner_uid(&self, pid: u32) -> Option<u32> {
        Some(self.processes.lock().unwrap().get(&pid)?.owner)
    }

    fn caller_uid(&self) -> u32 {
        CALLER
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        Some(format!("user{uid}"))
    }

    async fn scheduler_state(&self, pid: u32) -> Option<char> {
        Some(self.processes.lock().unwrap().get(&pid)?.state)
    }

    async fn supervisor(&self, pid: u32) -> Option<Supervisor> {
        self.processes
            .lock()
            .unwrap()
            .get(&pid)?
            .respawned_by
            .clone()
    }
}

#[derive(Default)]
struct FakeResolver {
    /// Details the live PID reports now; absent PIDs look like `dev_server`.
    current: HashMap<u32, ProcessDetails>,
}

#[async_trait]
impl DetailResolver for FakeResolver {
    async fn resolve(&self, pid: u32) -> ProcessDetails {
        self.current.get(&pid).cloned().unwrap_or_else(dev_server)
    }
}

fn started() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

fn dev_server() -> ProcessDetails {
    ProcessDetails {
        command_line: Some("node server.js".into()),
        owner: Some("dev".into()),
        start_time: Some(started()),
        working_directory: Some(PathBuf::from("/app")),
    }
}

fn record(pid: u32) -> ProcessRecord {
    ProcessRecord::new(pid, 3000, "node").with_details(dev_server())
}

fn terminator(system: &Arc<FakeSystem>, resolver: FakeResolver) -> Terminator {
    Terminator::new(
        TerminationSettings::default(),
        system.clone(),
        Arc::new(resolver),
    )
}

#[tokio::test(start_paused = true)]
async fn gone_process_is_confirmed_without_signals() {
    let system = Arc::new(FakeSystem::default());
    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(4242))
        .await;

    assert_eq!(report.outcome, TerminationOutcome::AlreadyGone);
    assert_eq!(report.phases, vec![Phase::NotStarted, Phase::Confirmed]);
    assert!(system.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reused_pid_is_never_signalled() {
    let system = FakeSystem::with([(100, FakeProcess::new(100))]);
    let resolver = FakeResolver {
        current: HashMap::from([(
            100,
            ProcessDetails {
                command_line: Some("postgres".into()),
                owner: Some("postgres".into()),
                start_time: Some(started() + Duration::from_secs(3600)),
                working_directory: Some(PathBuf::from("/var/lib/pg")),
            },
        )]),
    };

    let report = terminator(&system, resolver).terminate(&record(100)).await;

    assert!(matches!(
        report.outcome,
        TerminationOutcome::VerificationFailed(_)
    ));
    assert!(!report.visited(Phase::CheckingPermission));
    assert!(!report.visited(Phase::AttemptingGroupKill));
    assert!(system.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn group_is_stopped_gracefully() {
    let system = FakeSystem::with([(200, FakeProcess::new(200))]);
    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(200))
        .await;

    assert_eq!(report.outcome, TerminationOutcome::GracefullyStopped);
    assert_eq!(system.sent(), vec![Sent::Group(200, StopSignal::Graceful)]);
    assert_eq!(
        report.phases,
        vec![
            Phase::NotStarted,
            Phase::VerifyingIdentity,
            Phase::CheckingPermission,
            Phase::AttemptingGroupKill,
            Phase::WaitingGraceful,
            Phase::CheckingRespawn,
            Phase::Confirmed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stubborn_group_is_forced_after_base_window() {
    let mut process = FakeProcess::new(300);
    process.dies_on = Some(StopSignal::Force);
    let system = FakeSystem::with([(300, process)]);

    let start = Instant::now();
    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(300))
        .await;
    let elapsed = start.elapsed();

    assert_eq!(report.outcome, TerminationOutcome::ForceStopped);
    assert_eq!(
        system.sent(),
        vec![
            Sent::Group(300, StopSignal::Graceful),
            Sent::Group(300, StopSignal::Force),
        ]
    );
    // 3s grace, then the respawn check
    assert!(elapsed >= Duration::from_millis(3500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3700), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn single_member_group_waits_base_window() {
    let mut process = FakeProcess::new(310);
    process.dies_on = None;
    let system = FakeSystem::with([(310, process)]);

    let start = Instant::now();
    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(310))
        .await;
    let elapsed = start.elapsed();

    let TerminationOutcome::Error(detail) = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert!(detail.contains("did not terminate after force signal"));
    // grace window plus the force wait
    assert_eq!(elapsed, Duration::from_millis(3200));
}

#[tokio::test(start_paused = true)]
async fn large_group_gets_longer_window() {
    let mut process = FakeProcess::new(320);
    process.dies_on = None;
    process.members = 1000;
    let system = FakeSystem::with([(320, process)]);

    let start = Instant::now();
    terminator(&system, FakeResolver::default())
        .terminate(&record(320))
        .await;

    assert_eq!(start.elapsed(), Duration::from_millis(12_990 + 200));
}

#[tokio::test(start_paused = true)]
async fn huge_group_window_is_capped() {
    let mut process = FakeProcess::new(330);
    process.dies_on = None;
    process.members = 100_000;
    let system = FakeSystem::with([(330, process)]);

    let start = Instant::now();
    terminator(&system, FakeResolver::default())
        .terminate(&record(330))
        .await;

    assert_eq!(start.elapsed(), Duration::from_millis(30_000 + 200));
}

#[tokio::test(start_paused = true)]
async fn own_group_is_never_signalled() {
    let system = FakeSystem::with([(400, FakeProcess::new(OWN_GROUP))]);
    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(400))
        .await;

    assert_eq!(report.outcome, TerminationOutcome::GracefullyStopped);
    assert!(report.visited(Phase::SingleProcessFallback));
    assert!(!report.visited(Phase::AttemptingGroupKill));
    assert_eq!(system.sent(), vec![Sent::Process(400, StopSignal::Graceful)]);
}

#[tokio::test(start_paused = true)]
async fn missing_group_falls_back_to_single_process() {
    let mut process = FakeProcess::new(0);
    process.pgid = None;
    process.dies_on = Some(StopSignal::Force);
    let system = FakeSystem::with([(410, process)]);

    let start = Instant::now();
    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(410))
        .await;

    assert_eq!(report.outcome, TerminationOutcome::ForceStopped);
    assert_eq!(
        system.sent(),
        vec![
            Sent::Process(410, StopSignal::Graceful),
            Sent::Process(410, StopSignal::Force),
        ]
    );
    // fixed 3s window for the single-process path
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn foreign_owner_is_refused() {
    let mut process = FakeProcess::new(500);
    process.owner = 0;
    let system = FakeSystem::with([(500, process)]);

    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(500))
        .await;

    let TerminationOutcome::PermissionDenied(reason) = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert!(reason.contains("root"));
    assert!(system.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn uninterruptible_process_is_refused() {
    let mut process = FakeProcess::new(510);
    process.state = 'D';
    let system = FakeSystem::with([(510, process)]);

    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(510))
        .await;

    assert_eq!(report.outcome, TerminationOutcome::Unkillable('D'));
    assert!(system.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn respawn_is_reported_with_stop_hint() {
    let mut process = FakeProcess::new(600);
    process.respawned_by = Some(Supervisor {
        manager: "systemd".into(),
        stop_hint: "systemctl stop web.service".into(),
    });
    let system = FakeSystem::with([(600, process)]);

    let report = terminator(&system, FakeResolver::default())
        .terminate(&record(600))
        .await;

    assert_eq!(
        report.outcome,
        TerminationOutcome::RespawnedByManager {
            manager: "systemd".into(),
            stop_hint: "systemctl stop web.service".into(),
        }
    );
    assert!(!report.outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn batch_failures_are_isolated() {
    let system = FakeSystem::with([
        (700, FakeProcess::new(700)),
        (701, FakeProcess::new(701)),
    ]);
    let resolver = FakeResolver {
        current: HashMap::from([(
            700,
            ProcessDetails {
                command_line: Some("java -jar other.jar".into()),
                ..Default::default()
            },
        )]),
    };
    let records = [record(700), record(701), record(702)];

    let reports = terminator(&system, resolver)
        .terminate_batch(&records, &CancellationToken::new())
        .await;

    let outcomes: Vec<_> = reports.iter().map(|r| (r.pid, r.outcome.clone())).collect();
    assert!(matches!(
        outcomes[0],
        (700, TerminationOutcome::VerificationFailed(_))
    ));
    assert_eq!(outcomes[1], (701, TerminationOutcome::GracefullyStopped));
    assert_eq!(outcomes[2], (702, TerminationOutcome::AlreadyGone));
    assert_eq!(system.sent(), vec![Sent::Group(701, StopSignal::Graceful)]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_batch_attempts_nothing() {
    let system = FakeSystem::with([(800, FakeProcess::new(800))]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let reports = terminator(&system, FakeResolver::default())
        .terminate_batch(&[record(800)], &cancel)
        .await;

    assert!(reports.is_empty());
    assert!(system.sent().is_empty());
}
