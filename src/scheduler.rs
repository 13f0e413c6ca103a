//! Parallel execution of the task graph.
//!
//! The scheduler validates the registry eagerly, then dispatches tasks with
//! a dependency-counting parallel topological walk: every task whose
//! dependencies have all completed is spawned on the rayon pool, and as each
//! completion comes back over a channel the counts of its dependents are
//! decremented, spawning the newly eligible ones. Tasks with no dependency
//! relationship run concurrently in no particular order; a task joining on
//! several dependencies starts only after all of them have completed.
//!
//! The first action failure stops further dispatch. Tasks already in flight
//! are not cancelled; the scheduler drains their completions and then
//! reports which task failed. Nothing is retried and nothing is cached, so
//! running the same registry twice re-executes every task.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crossbeam_channel::unbounded;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

use crate::error::{BuildError, GraphError};
use crate::task::{Task, TaskRegistry};

/// Runs every task reachable from `targets`, dependencies first.
pub fn run<S: AsRef<str>>(registry: &TaskRegistry, targets: &[S]) -> Result<(), BuildError> {
    let tasks = validate(registry, targets)?;
    execute(&tasks).map(drop)
}

/// Checks the registry before any task action runs: every dependency must
/// resolve, every target must be registered, and the graph restricted to
/// tasks reachable from the targets must be acyclic. Returns the reachable
/// tasks.
fn validate<'a, S: AsRef<str>>(
    registry: &'a TaskRegistry,
    targets: &[S],
) -> Result<Vec<&'a Task>, GraphError> {
    let mut names: Vec<_> = registry.tasks().map(Task::name).collect();
    names.sort_unstable();

    for &name in &names {
        let task = registry.get(name).unwrap();
        for dependency in task.dependencies() {
            if registry.get(dependency).is_none() {
                return Err(GraphError::UnknownDependency {
                    task: task.name().to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    // Depth-first walk from the targets to find the reachable subgraph.
    let mut reachable = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = Vec::new();

    for target in targets {
        let target = target.as_ref();
        if registry.get(target).is_none() {
            return Err(GraphError::UnknownTask(target.to_string()));
        }
        stack.push(target);
    }

    while let Some(name) = stack.pop() {
        if !seen.insert(name) {
            continue;
        }
        let task = registry.get(name).unwrap();
        reachable.push(task);
        stack.extend(task.dependencies().iter().map(String::as_str));
    }

    reachable.sort_by(|a, b| a.name().cmp(b.name()));
    detect_cycle(&reachable)?;

    Ok(reachable)
}

/// Rejects a reachable subgraph containing a cycle, reporting the names of
/// the cycle members.
fn detect_cycle(tasks: &[&Task]) -> Result<(), GraphError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();

    for task in tasks {
        let index = graph.add_node(task.name());
        indices.insert(task.name(), index);
    }

    for task in tasks {
        let target = indices[task.name()];
        for dependency in task.dependencies() {
            // Dependencies outside the reachable set cannot exist; validate
            // resolved all of them against the registry already.
            graph.add_edge(indices[dependency.as_str()], target, ());
        }
    }

    for component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .iter()
                .any(|&n| graph.contains_edge(n, n));

        if cyclic {
            let mut members: Vec<String> =
                component.iter().map(|&n| graph[n].to_string()).collect();
            members.sort_unstable();
            return Err(GraphError::CyclicDependency(members));
        }
    }

    Ok(())
}

/// Dependency-counting dispatch loop over an already validated task set.
fn execute(tasks: &[&Task]) -> Result<usize, BuildError> {
    let total = tasks.len();
    if total == 0 {
        return Ok(0);
    }

    let positions: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| (task.name(), i))
        .collect();

    // Map from a task to the tasks that wait on it, plus per-task counts of
    // unfinished dependencies.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); total];
    let mut counts: Vec<usize> = vec![0; total];

    for (index, task) in tasks.iter().enumerate() {
        counts[index] = task.dependencies().len();
        for dependency in task.dependencies() {
            dependents[positions[dependency.as_str()]].push(index);
        }
    }

    let mp = MultiProgress::new();
    let main_pb = mp.add(ProgressBar::new(total as u64));
    main_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("invalid progress bar template")
            .progress_chars("=>-"),
    );
    main_pb.set_message("Running tasks...");

    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .expect("invalid progress bar template");

    let (result_sender, result_receiver) = unbounded::<(usize, anyhow::Result<()>)>();

    let mut completed = 0usize;
    let mut in_flight = 0usize;
    let mut failure: Option<BuildError> = None;

    rayon::scope(|s| {
        let spawn = |index: usize| {
            let task = tasks[index];
            let sender = result_sender.clone();
            let mp = mp.clone();
            let style = spinner_style.clone();

            s.spawn(move |_| {
                let pb = mp.add(ProgressBar::new_spinner());
                pb.set_style(style);
                pb.set_message(task.name().to_string());
                pb.enable_steady_tick(Duration::from_millis(100));

                let result = task.execute();

                pb.finish_and_clear();
                // The receiver outlives the scope, so this cannot fail.
                let _ = sender.send((index, result));
            });
        };

        // Seed every task with no pending dependencies.
        for index in 0..total {
            if counts[index] == 0 {
                spawn(index);
                in_flight += 1;
            }
        }

        // Completion loop. On failure we keep draining results from tasks
        // already in flight, but stop dispatching new ones.
        while in_flight > 0 {
            let (done, result) = result_receiver
                .recv()
                .expect("completion channel closed unexpectedly");
            in_flight -= 1;
            main_pb.inc(1);

            match result {
                Ok(()) => {
                    completed += 1;

                    if failure.is_none() {
                        for &next in &dependents[done] {
                            counts[next] -= 1;
                            if counts[next] == 0 {
                                spawn(next);
                                in_flight += 1;
                            }
                        }
                    }
                }
                Err(source) => {
                    tracing::error!(task = tasks[done].name(), "task failed: {source:#}");

                    if failure.is_none() {
                        failure = Some(BuildError::Task {
                            name: tasks[done].name().to_string(),
                            source,
                        });
                    }
                }
            }
        }
    });

    match failure {
        Some(err) => {
            main_pb.abandon_with_message("Build failed");
            Err(err)
        }
        None => {
            main_pb.finish_with_message("Build complete");
            Ok(completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// A task that appends its name to a shared log when it runs.
    fn logged(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Task {
        let log = log.clone();
        let id = name.to_string();
        Task::new(name).action(move || {
            log.lock().unwrap().push(id.clone());
            Ok(())
        })
    }

    fn diamond(log: &Arc<Mutex<Vec<String>>>) -> TaskRegistry {
        TaskRegistry::config()
            .add_task(logged("fonts", log))
            .add_task(logged("icons", log))
            .add_task(logged("css", log))
            .add_task(logged("js", log))
            .add_task(logged("dist", log).depends_on(["css", "js", "fonts", "icons"]))
            .finish()
            .unwrap()
    }

    #[test]
    fn test_runs_every_reachable_task_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = diamond(&log);

        run(&registry, &["dist"]).unwrap();

        let mut log = log.lock().unwrap().clone();
        assert_eq!(log.pop(), Some("dist".to_string()));
        log.sort();
        assert_eq!(log, ["css", "fonts", "icons", "js"]);
    }

    #[test]
    fn test_unreachable_tasks_are_not_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = diamond(&log);

        run(&registry, &["css"]).unwrap();

        assert_eq!(*log.lock().unwrap(), ["css"]);
    }

    #[test]
    fn test_cycle_names_members_and_runs_nothing() {
        let actions = Arc::new(AtomicUsize::new(0));
        let count = |actions: &Arc<AtomicUsize>| {
            let actions = actions.clone();
            move || -> anyhow::Result<()> {
                actions.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };

        let registry = TaskRegistry::config()
            .add_task(Task::new("a").depends_on(["b"]).action(count(&actions)))
            .add_task(Task::new("b").depends_on(["a"]).action(count(&actions)))
            .finish()
            .unwrap();

        let err = run(&registry, &["a"]).unwrap_err();

        match err {
            BuildError::Graph(GraphError::CyclicDependency(members)) => {
                assert_eq!(members, ["a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(actions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_dependency_detected_eagerly() {
        let registry = TaskRegistry::config()
            .add_task(Task::new("a").depends_on(["ghost"]))
            .finish()
            .unwrap();

        let err = run(&registry, &["a"]).unwrap_err();

        assert!(matches!(
            err,
            BuildError::Graph(GraphError::UnknownDependency { task, dependency })
                if task == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_unknown_target() {
        let registry = TaskRegistry::config()
            .add_task(Task::new("a"))
            .finish()
            .unwrap();

        let err = run(&registry, &["ghost"]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Graph(GraphError::UnknownTask(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_join_waits_for_all_dependencies() {
        // x is slow, y is fast; z must observe both regardless.
        let done = Arc::new(Mutex::new(HashSet::new()));

        let slow = |name: &'static str, ms: u64, done: &Arc<Mutex<HashSet<&'static str>>>| {
            let done = done.clone();
            Task::new(name).action(move || {
                std::thread::sleep(Duration::from_millis(ms));
                done.lock().unwrap().insert(name);
                Ok(())
            })
        };

        let join = {
            let done = done.clone();
            Task::new("z").depends_on(["x", "y"]).action(move || {
                let done = done.lock().unwrap();
                anyhow::ensure!(done.contains("x") && done.contains("y"));
                Ok(())
            })
        };

        let registry = TaskRegistry::config()
            .add_task(slow("x", 50, &done))
            .add_task(slow("y", 1, &done))
            .add_task(join)
            .finish()
            .unwrap();

        run(&registry, &["z"]).unwrap();
    }

    #[test]
    fn test_failure_stops_dispatch_but_drains_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let sibling = {
            let log = log.clone();
            Task::new("sibling").action(move || {
                std::thread::sleep(Duration::from_millis(50));
                log.lock().unwrap().push("sibling".to_string());
                Ok(())
            })
        };

        let registry = TaskRegistry::config()
            .add_task(Task::new("broken").action(|| anyhow::bail!("boom")))
            .add_task(sibling)
            .add_task(logged("dependent", &log).depends_on(["broken"]))
            .finish()
            .unwrap();

        let err = run(&registry, &["broken", "sibling", "dependent"]).unwrap_err();

        assert!(matches!(&err, BuildError::Task { name, .. } if name == "broken"));
        // The in-flight sibling finished; the dependent never started.
        assert_eq!(*log.lock().unwrap(), ["sibling"]);
    }

    #[test]
    fn test_rerun_executes_everything_again() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = diamond(&log);

        run(&registry, &["dist"]).unwrap();
        run(&registry, &["dist"]).unwrap();

        assert_eq!(log.lock().unwrap().len(), 10);
    }
}
