//! Tests for loading Flockfiles from disk and running their tasks.

mod common;

use common::*;
use flock::connection::{AuthMethod, PtyType};
use flock::environment::Environment;
use flock::error::Error;
use flock::flockfile::{Condition, Flockfile, HostEntry};
use flock::inventory::Role;
use flock::{Flock, Request};
use pretty_assertions::assert_eq;

const FLOCKFILE: &str = r#"
hosts:
  - deploy@10.0.0.1
  - ip: 10.0.0.2
    user: deploy
    roles: [db]

environments:
  staging:
    hosts:
      - deploy@10.0.1.1
    tasks:
      reset:
        steps:
          - run: bin/reset
            within: [/srv/app/current]

tasks:
  deploy:
    steps:
      - run: git fetch --all
        within: [/srv/app, repo]
      - run: bin/migrate
        roles: [db]
        pty: none
        only_if:
          file_exists: bin/migrate
        within: [/srv/app]
  version:
    namespace: app
    steps:
      - capture: cat REVISION
        within: [/srv/app/current]
"#;

fn configure(project: &TestProject, mock: &MockConnector, environment: &str) -> Flock {
    let flockfile = Flockfile::load(project.flockfile()).unwrap();
    let environments = flockfile.environments();
    let candidates: Vec<&dyn Environment> =
        environments.iter().map(|e| e as &dyn Environment).collect();

    let mut flock = Flock::new(mock.clone()).with_default_auth(Some(AuthMethod::Agent));
    flock
        .configure(&flockfile, &candidates, Some(environment))
        .unwrap();
    flock
}

#[test]
fn test_load_from_disk() {
    let project = TestProject::new(FLOCKFILE);
    let flockfile = Flockfile::load(project.flockfile()).unwrap();

    assert_eq!(flockfile.path(), project.flockfile().as_path());
    assert_eq!(flockfile.hosts.len(), 2);
    assert!(matches!(flockfile.hosts[1], HostEntry::Detailed(_)));
    assert_eq!(
        flockfile.tasks["deploy"].steps[1].only_if,
        Some(Condition::FileExists("bin/migrate".into()))
    );
    assert_eq!(flockfile.tasks["deploy"].steps[1].roles, vec![Role::Db]);
}

#[test]
fn test_missing_file_names_path() {
    let project = TestProject::new(FLOCKFILE);
    let path = project.path().join("Nope.yml");

    let err = Flockfile::load(&path).unwrap_err();
    assert!(matches!(err, Error::FlockfileLoad { .. }));
    assert!(err
        .to_string()
        .starts_with(&format!("Failed to load Flockfile '{}'", path.display())));
}

#[test]
fn test_malformed_yaml_is_load_error() {
    let project = TestProject::new("hosts: [deploy@10.0.0.1\n");
    let err = Flockfile::load(project.flockfile()).unwrap_err();
    assert!(matches!(err, Error::FlockfileLoad { .. }));
}

#[test]
fn test_unknown_fields_are_rejected() {
    let project = TestProject::new("tasks:\n  deploy:\n    stepz: []\n");
    let err = Flockfile::load(project.flockfile()).unwrap_err();
    assert!(err.to_string().contains("stepz"));
}

#[test]
fn test_misspelled_host_field_is_rejected() {
    let project = TestProject::new("hosts:\n  - ip: 10.0.0.2\n    user: deploy\n    role: [db]\n");
    let err = Flockfile::load(project.flockfile()).unwrap_err();
    assert!(matches!(err, Error::FlockfileLoad { .. }));
}

#[test]
fn test_host_credentials_and_guards_as_maps() {
    let project = TestProject::new(
        r#"
hosts:
  - ip: 10.0.0.2
    user: deploy
    auth:
      key:
        private_key: /keys/deploy_ed25519
  - ip: 10.0.0.3
    user: deploy
    auth: agent

tasks:
  restart:
    steps:
      - run: systemctl restart app
        unless:
          command_succeeds: systemctl is-active app
"#,
    );
    let flockfile = Flockfile::load(project.flockfile()).unwrap();

    match &flockfile.hosts[0] {
        HostEntry::Detailed(spec) => {
            assert_eq!(spec.auth, Some(AuthMethod::key("/keys/deploy_ed25519")))
        }
        other => panic!("expected a detailed host, got {:?}", other),
    }
    match &flockfile.hosts[1] {
        HostEntry::Detailed(spec) => assert_eq!(spec.auth, Some(AuthMethod::Agent)),
        other => panic!("expected a detailed host, got {:?}", other),
    }
    assert_eq!(
        flockfile.tasks["restart"].steps[0].unless,
        Some(Condition::CommandSucceeds("systemctl is-active app".into()))
    );

    // Per-host credentials make a default unnecessary.
    let mut flock = Flock::new(MockConnector::new());
    flock.configure(&flockfile, &[], None).unwrap();
    assert_eq!(
        flock.hosts()[0].auth,
        Some(AuthMethod::key("/keys/deploy_ed25519"))
    );
}

#[test]
fn test_bad_host_string_fails_configure() {
    let project = TestProject::new("hosts:\n  - 10.0.0.1\n");
    let flockfile = Flockfile::load(project.flockfile()).unwrap();
    let mut flock = Flock::new(MockConnector::new()).with_default_auth(Some(AuthMethod::Agent));

    let err = flock.configure(&flockfile, &[], None).unwrap_err();
    assert!(matches!(err, Error::FlockfileLoad { .. }));
    assert!(err.to_string().contains("10.0.0.1"));
}

#[test]
fn test_environment_hosts_and_tasks() {
    let project = TestProject::new(FLOCKFILE);
    let mock = MockConnector::new();
    let flock = configure(&project, &mock, "staging");

    assert_eq!(flock.environment(), Some("staging"));
    let hosts: Vec<_> = flock.hosts().iter().map(ToString::to_string).collect();
    assert_eq!(
        hosts,
        vec!["deploy@10.0.0.1:22", "deploy@10.0.0.2:22", "deploy@10.0.1.1:22"]
    );
    assert_eq!(
        flock.tasks().full_names(),
        vec!["deploy", "app:version", "reset"]
    );

    let production = configure(&project, &MockConnector::new(), "production");
    assert_eq!(production.hosts().len(), 2);
    assert_eq!(production.tasks().full_names(), vec!["deploy", "app:version"]);
}

#[test]
fn test_deploy_runs_step_by_step() {
    let project = TestProject::new(FLOCKFILE);
    let mock = MockConnector::new();
    let flock = configure(&project, &mock, "production");

    assert_eq!(flock.run(&Request::Run("deploy".into())), 0);

    let sent: Vec<_> = mock
        .commands()
        .into_iter()
        .map(|s| (s.host, s.command, s.pty))
        .collect();
    assert_eq!(
        sent,
        vec![
            (
                "10.0.0.1".to_string(),
                "cd /srv/app; cd repo; git fetch --all".to_string(),
                Some(PtyType::Vanilla)
            ),
            (
                "10.0.0.2".to_string(),
                "cd /srv/app; cd repo; git fetch --all".to_string(),
                Some(PtyType::Vanilla)
            ),
            (
                "10.0.0.2".to_string(),
                "cd /srv/app; test -f bin/migrate".to_string(),
                None
            ),
            (
                "10.0.0.2".to_string(),
                "cd /srv/app; bin/migrate".to_string(),
                None
            ),
        ]
    );
}

#[test]
fn test_condition_skips_step() {
    let project = TestProject::new(FLOCKFILE);
    let mock = MockConnector::new();
    mock.set_status("10.0.0.2", "cd /srv/app; test -f bin/migrate", 1);
    let flock = configure(&project, &mock, "production");

    assert_eq!(flock.run(&Request::Run("deploy".into())), 0);
    assert_eq!(
        mock.commands_for("10.0.0.2"),
        vec![
            "cd /srv/app; cd repo; git fetch --all",
            "cd /srv/app; test -f bin/migrate",
        ]
    );
}

#[test]
fn test_failing_step_stops_remaining_hosts() {
    let project = TestProject::new(FLOCKFILE);
    let mock = MockConnector::new();
    mock.set_status("10.0.0.1", "cd /srv/app; cd repo; git fetch --all", 128);
    let flock = configure(&project, &mock, "production");

    assert_eq!(flock.run(&Request::Run("deploy".into())), 1);
    assert_eq!(mock.commands().len(), 1);
}

#[test]
fn test_capture_step_failure_exits_one() {
    let project = TestProject::new(FLOCKFILE);
    let mock = MockConnector::new();
    mock.set_output("10.0.0.1", "cd /srv/app/current; cat REVISION", 0, "3f2a9c1\n");
    mock.set_output(
        "10.0.0.2",
        "cd /srv/app/current; cat REVISION",
        1,
        "cat: REVISION: No such file or directory\n",
    );
    let flock = configure(&project, &mock, "production");

    assert_eq!(flock.run(&Request::Run("app:version".into())), 1);
    assert_eq!(mock.commands().len(), 2);
}
