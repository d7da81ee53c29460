use super::*;
use crate::container::descriptor::Port;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    List,
    Create(String),
    Start(String),
    Pull(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct FakeContainer {
    image: String,
    running: bool,
    exposed: BTreeSet<Port>,
    bindings: PortBindings,
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    images: HashSet<String>,
    calls: Vec<Call>,
    fail_list: bool,
    fail_start: HashSet<String>,
    fail_pull: HashSet<String>,
    /// Images whose pull succeeds without making them available
    phantom_images: HashSet<String>,
}

/// In-memory runtime that records every call.
#[derive(Default)]
struct FakeRuntime {
    state: Mutex<FakeState>,
    panic_on_start: HashSet<String>,
    structured_state: bool,
}

impl FakeRuntime {
    fn new() -> Self {
        Self::default()
    }

    fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    fn with_container(self, name: &str, image: &str, running: bool) -> Self {
        self.state.lock().unwrap().containers.insert(
            name.to_string(),
            FakeContainer {
                image: image.to_string(),
                running,
                exposed: BTreeSet::new(),
                bindings: PortBindings::new(),
            },
        );
        self.with_image(image)
    }

    fn failing_start(self, name: &str) -> Self {
        self.state.lock().unwrap().fail_start.insert(name.to_string());
        self
    }

    fn failing_pull(self, image: &str) -> Self {
        self.state.lock().unwrap().fail_pull.insert(image.to_string());
        self
    }

    fn phantom_image(self, image: &str) -> Self {
        self.state.lock().unwrap().phantom_images.insert(image.to_string());
        self
    }

    fn failing_list(self) -> Self {
        self.state.lock().unwrap().fail_list = true;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    fn is_running(&self, name: &str) -> bool {
        self.container(name).map(|c| c.running).unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerObservation>> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::List);
            if state.fail_list {
                return Err(ContainerError::RuntimeQuery("daemon unavailable".to_string()));
            }
            state
                .containers
                .iter()
                .filter(|(_, c)| all || c.running)
                .map(|(name, c)| ContainerObservation {
                    names: vec![format!("/{}", name)],
                    image: c.image.clone(),
                    status: if c.running {
                        "Up 1 second".to_string()
                    } else {
                        "Exited (0) 1 second ago".to_string()
                    },
                    state: self.structured_state.then_some(if c.running {
                        ObservedState::Running
                    } else {
                        ObservedState::Exited
                    }),
                })
                .collect()
        };
        // Let concurrent callers observe the same snapshot.
        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn create_container(&self, request: &CreateRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(request.name.clone()));
        if state.containers.contains_key(&request.name) {
            return Err(ContainerError::RuntimeCreate {
                name: request.name.clone(),
                message: "Conflict. The container name is already in use".to_string(),
            });
        }
        if !state.images.contains(&request.image) {
            return Err(ContainerError::ImageNotFound(request.image.clone()));
        }
        state.containers.insert(
            request.name.clone(),
            FakeContainer {
                image: request.image.clone(),
                running: false,
                exposed: request.exposed_ports.clone(),
                bindings: request.port_bindings.clone(),
            },
        );
        Ok(())
    }

    async fn start_container(&self, name: &str, _bindings: &PortBindings) -> Result<()> {
        if self.panic_on_start.contains(name) {
            panic!("runtime adapter crashed while starting {}", name);
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(name.to_string()));
        if state.fail_start.contains(name) {
            return Err(ContainerError::RuntimeStart {
                name: name.to_string(),
                message: "driver failed programming external connectivity".to_string(),
            });
        }
        match state.containers.get_mut(name) {
            None => Err(ContainerError::ContainerNotFound(name.to_string())),
            Some(container) if container.running => {
                Err(ContainerError::AlreadyRunning(name.to_string()))
            }
            Some(container) => {
                container.running = true;
                Ok(())
            }
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Pull(image.to_string()));
        if state.fail_pull.contains(image) {
            return Err(ContainerError::RuntimePull {
                image: image.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        if !state.phantom_images.contains(image) {
            state.images.insert(image.to_string());
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove(name.to_string()));
        let running = match state.containers.get(name) {
            None => return Err(ContainerError::ContainerNotFound(name.to_string())),
            Some(container) => container.running,
        };
        if running && !force {
            return Err(ContainerError::RuntimeRemove {
                name: name.to_string(),
                message: "cannot remove a running container".to_string(),
            });
        }
        state.containers.remove(name);
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "fake"
    }
}

/// Probe that tracks how many containers are settling at once.
#[derive(Default)]
struct CountingProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl ReadinessProbe for CountingProbe {
    async fn wait_ready(&self, _descriptor: &ContainerDescriptor) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn postgres() -> ContainerDescriptor {
    ContainerDescriptor::new("postgres", "postgres:latest", vec!["5432".to_string()])
}

fn reconciler(runtime: &Arc<FakeRuntime>) -> Reconciler {
    Reconciler::with_readiness(runtime.clone(), Arc::new(NoWait), ReconcilerConfig::default())
}

fn orchestrator(runtime: &Arc<FakeRuntime>) -> Orchestrator {
    Orchestrator::new(
        runtime.clone(),
        OrchestratorConfig {
            readiness: Arc::new(NoWait),
            ..OrchestratorConfig::default()
        },
    )
}

fn services(count: usize) -> Vec<ContainerDescriptor> {
    (0..count)
        .map(|i| {
            ContainerDescriptor::new(
                format!("svc-{}", i),
                "busybox:latest",
                vec![(7000 + i).to_string()],
            )
        })
        .collect()
}

// Reconciler

#[tokio::test]
async fn test_setup_is_noop_when_running() {
    let runtime = Arc::new(FakeRuntime::new().with_container("postgres", "postgres:latest", true));

    let outcome = reconciler(&runtime).setup(&postgres()).await.unwrap();

    assert_eq!(outcome, Outcome::AlreadyRunning);
    assert_eq!(runtime.calls(), vec![Call::List]);
}

#[tokio::test]
async fn test_setup_pulls_creates_and_starts_missing_container() {
    let runtime = Arc::new(FakeRuntime::new());
    let reconciler = reconciler(&runtime);

    let outcome = reconciler.setup(&postgres()).await.unwrap();

    assert_eq!(outcome, Outcome::Pulled);
    assert_eq!(
        runtime.calls(),
        vec![
            Call::List,
            Call::Start("postgres".to_string()),
            Call::Create("postgres".to_string()),
            Call::Pull("postgres:latest".to_string()),
            Call::Create("postgres".to_string()),
            Call::Start("postgres".to_string()),
        ]
    );

    let container = runtime.container("postgres").unwrap();
    let port = Port::parse("5432").unwrap();
    assert!(container.running);
    assert!(container.exposed.contains(&port));
    assert_eq!(
        container.bindings.get(&port),
        Some(&HostBinding {
            host_ip: "0.0.0.0".to_string(),
            host_port: 5432,
        })
    );
    assert!(reconciler.is_running(&postgres()).await.unwrap());
}

#[tokio::test]
async fn test_setup_creates_when_image_is_local() {
    let runtime = Arc::new(FakeRuntime::new().with_image("postgres:latest"));

    let outcome = reconciler(&runtime).setup(&postgres()).await.unwrap();

    assert_eq!(outcome, Outcome::Created);
    assert_eq!(runtime.count(|c| matches!(c, Call::Pull(_))), 0);
    assert_eq!(runtime.count(|c| matches!(c, Call::Create(_))), 1);
    assert!(runtime.is_running("postgres"));
}

#[tokio::test]
async fn test_setup_starts_stopped_container() {
    let runtime = Arc::new(FakeRuntime::new().with_container("postgres", "postgres:latest", false));

    let outcome = reconciler(&runtime).setup(&postgres()).await.unwrap();

    assert_eq!(outcome, Outcome::Started);
    assert_eq!(
        runtime.calls(),
        vec![Call::List, Call::Start("postgres".to_string())]
    );
}

#[tokio::test]
async fn test_concurrent_setups_tolerate_already_running() {
    let runtime = Arc::new(FakeRuntime::new().with_container("postgres", "postgres:latest", false));
    let reconciler = reconciler(&runtime);
    let descriptor = postgres();

    let (first, second) = tokio::join!(reconciler.setup(&descriptor), reconciler.setup(&descriptor));

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| *o == Outcome::AlreadyRunning);
    assert_eq!(outcomes, vec![Outcome::Started, Outcome::AlreadyRunning]);
    assert_eq!(runtime.count(|c| matches!(c, Call::Start(_))), 2);
    assert!(runtime.is_running("postgres"));
}

#[tokio::test]
async fn test_persistently_missing_image_fails_after_one_pull() {
    let runtime = Arc::new(FakeRuntime::new().phantom_image("postgres:latest"));

    let result = reconciler(&runtime).setup(&postgres()).await;

    assert!(matches!(result, Err(ContainerError::RuntimeCreate { .. })));
    assert_eq!(runtime.count(|c| matches!(c, Call::Pull(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, Call::Create(_))), 2);
    assert_eq!(runtime.count(|c| matches!(c, Call::Start(_))), 1);
}

#[tokio::test]
async fn test_pull_failure_is_terminal() {
    let runtime = Arc::new(FakeRuntime::new().failing_pull("postgres:latest"));

    let result = reconciler(&runtime).setup(&postgres()).await;

    match result {
        Err(ContainerError::RuntimePull { image, .. }) => assert_eq!(image, "postgres:latest"),
        other => panic!("expected pull failure, got {:?}", other),
    }
    assert_eq!(runtime.count(|c| matches!(c, Call::Create(_))), 1);
}

#[tokio::test]
async fn test_start_failure_is_terminal() {
    let runtime = Arc::new(
        FakeRuntime::new()
            .with_container("postgres", "postgres:latest", false)
            .failing_start("postgres"),
    );

    let result = reconciler(&runtime).setup(&postgres()).await;

    assert!(matches!(result, Err(ContainerError::RuntimeStart { .. })));
    assert_eq!(runtime.count(|c| matches!(c, Call::Create(_))), 0);
}

#[tokio::test]
async fn test_query_failure_surfaces() {
    let runtime = Arc::new(FakeRuntime::new().failing_list());

    let result = reconciler(&runtime).setup(&postgres()).await;

    assert!(matches!(result, Err(ContainerError::RuntimeQuery(_))));
    assert_eq!(runtime.calls(), vec![Call::List]);
}

#[tokio::test]
async fn test_structured_state_drives_running_check() {
    let runtime = FakeRuntime {
        structured_state: true,
        ..FakeRuntime::default()
    };
    let runtime = Arc::new(runtime.with_container("postgres", "postgres:latest", true));
    assert!(reconciler(&runtime).is_running(&postgres()).await.unwrap());

    let runtime = FakeRuntime {
        structured_state: true,
        ..FakeRuntime::default()
    };
    let runtime = Arc::new(runtime.with_container("postgres", "postgres:latest", false));
    assert!(!reconciler(&runtime).is_running(&postgres()).await.unwrap());
}

#[tokio::test]
async fn test_teardown_removes_without_checking() {
    let runtime = Arc::new(FakeRuntime::new().with_container("postgres", "postgres:latest", true));

    let outcome = reconciler(&runtime).teardown(&postgres()).await.unwrap();

    assert_eq!(outcome, Outcome::Removed);
    assert_eq!(runtime.calls(), vec![Call::Remove("postgres".to_string())]);
    assert!(runtime.container("postgres").is_none());
}

#[tokio::test]
async fn test_teardown_of_absent_container() {
    let runtime = Arc::new(FakeRuntime::new());

    let lenient = reconciler(&runtime).teardown(&postgres()).await.unwrap();
    assert_eq!(lenient, Outcome::Absent);

    let strict = Reconciler::with_readiness(
        runtime.clone(),
        Arc::new(NoWait),
        ReconcilerConfig {
            strict_teardown: true,
        },
    );
    assert!(matches!(
        strict.teardown(&postgres()).await,
        Err(ContainerError::ContainerNotFound(_))
    ));
}

#[tokio::test]
async fn test_refresh_converges_from_any_state() {
    let cases = [
        (FakeRuntime::new(), Outcome::Pulled),
        (
            FakeRuntime::new().with_container("postgres", "postgres:latest", false),
            Outcome::Started,
        ),
        (
            FakeRuntime::new().with_container("postgres", "postgres:latest", true),
            Outcome::Refreshed,
        ),
    ];

    for (runtime, expected) in cases {
        let runtime = Arc::new(runtime);
        let reconciler = reconciler(&runtime);

        let outcome = reconciler.refresh(&postgres()).await.unwrap();

        assert_eq!(outcome, expected);
        assert!(reconciler.is_running(&postgres()).await.unwrap());
    }
}

#[tokio::test]
async fn test_refresh_recreates_running_container() {
    let runtime = Arc::new(FakeRuntime::new().with_container("postgres", "postgres:latest", true));

    reconciler(&runtime).refresh(&postgres()).await.unwrap();

    let calls = runtime.calls();
    let removed = calls
        .iter()
        .position(|c| *c == Call::Remove("postgres".to_string()))
        .unwrap();
    let created = calls
        .iter()
        .position(|c| *c == Call::Create("postgres".to_string()))
        .unwrap();
    assert!(removed < created);
    assert_eq!(runtime.count(|c| matches!(c, Call::Pull(_))), 0);
}

// Orchestrator

#[tokio::test]
async fn test_bootstrap_reconciles_every_descriptor() {
    let runtime = Arc::new(FakeRuntime::new().with_image("busybox:latest"));
    let descriptors = services(5);

    let report = orchestrator(&runtime).bootstrap(&descriptors).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.operation, Operation::Bootstrap);
    let names: Vec<&str> = report.containers.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["svc-0", "svc-1", "svc-2", "svc-3", "svc-4"]);
    for descriptor in &descriptors {
        assert!(runtime.is_running(&descriptor.name));
    }
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_others() {
    let runtime = Arc::new(
        FakeRuntime::new()
            .with_image("busybox:latest")
            .failing_start("svc-1"),
    );
    let descriptors = services(3);

    let report = orchestrator(&runtime).bootstrap(&descriptors).await.unwrap();

    assert!(!report.is_success());
    let failed: Vec<&str> = report.failures().map(|(name, _)| name).collect();
    assert_eq!(failed, vec!["svc-1"]);
    assert!(runtime.is_running("svc-0"));
    assert!(runtime.is_running("svc-2"));

    match report.into_result() {
        Err(ContainerError::Failed(names)) => assert_eq!(names, vec!["svc-1".to_string()]),
        other => panic!("expected aggregated failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_panicking_task_is_reported() {
    let mut runtime = FakeRuntime::new().with_container("svc-0", "busybox:latest", false);
    runtime.panic_on_start.insert("svc-0".to_string());
    let runtime = Arc::new(runtime.with_container("svc-1", "busybox:latest", false));

    let report = orchestrator(&runtime).bootstrap(&services(2)).await.unwrap();

    assert!(matches!(
        report.get("svc-0"),
        Some(Err(ContainerError::TaskFailed { .. }))
    ));
    assert!(matches!(report.get("svc-1"), Some(Ok(Outcome::Started))));
}

#[tokio::test]
async fn test_duplicate_names_rejected_before_spawning() {
    let runtime = Arc::new(FakeRuntime::new());
    let descriptors = vec![postgres(), postgres()];

    let result = orchestrator(&runtime).bootstrap(&descriptors).await;

    assert!(matches!(result, Err(ContainerError::DuplicateName(_))));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_teardown_and_refresh_operations() {
    let runtime = Arc::new(
        FakeRuntime::new()
            .with_container("svc-0", "busybox:latest", true)
            .with_container("svc-1", "busybox:latest", false),
    );
    let orchestrator = orchestrator(&runtime);
    let descriptors = services(3);

    let refreshed = orchestrator.refresh(&descriptors).await.unwrap();
    assert!(matches!(refreshed.get("svc-0"), Some(Ok(Outcome::Refreshed))));
    assert!(matches!(refreshed.get("svc-1"), Some(Ok(Outcome::Started))));
    assert!(matches!(refreshed.get("svc-2"), Some(Ok(Outcome::Created))));

    let removed = orchestrator.teardown(&descriptors).await.unwrap().into_result().unwrap();
    assert!(removed.iter().all(|(_, outcome)| *outcome == Outcome::Removed));

    let again = orchestrator.teardown(&descriptors).await.unwrap();
    assert!(again.is_success());
    assert!(matches!(again.get("svc-0"), Some(Ok(Outcome::Absent))));
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit() {
    for (limit, expected_peak) in [(None, 4), (Some(1), 1), (Some(2), 2)] {
        let runtime = Arc::new(FakeRuntime::new().with_image("busybox:latest"));
        let probe = Arc::new(CountingProbe::default());
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            OrchestratorConfig {
                max_concurrency: limit,
                readiness: probe.clone(),
                ..OrchestratorConfig::default()
            },
        );

        let report = orchestrator.bootstrap(&services(4)).await.unwrap();

        assert!(report.is_success());
        assert_eq!(probe.peak.load(Ordering::SeqCst), expected_peak);
    }
}
