/// End-to-end publish flows for ServicePublisher.
///
/// A scripted MockProvider plays the backend and reports registration
/// group transitions; tests assert how the publisher's state machine
/// reacts and that every committed registration is released again.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use zeroconf_bridge::{Error, GroupState, MockProvider, PublishRequest, ServicePublisher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    RegistrationFailed,
    NameCollision,
    Other,
}

fn kind(error: &Error) -> ErrorKind {
    match error {
        Error::RegistrationFailed { .. } => ErrorKind::RegistrationFailed,
        Error::NameCollision { .. } => ErrorKind::NameCollision,
        _ => ErrorKind::Other,
    }
}

fn publish_sink() -> (Arc<Mutex<Vec<PublishRequest>>>, impl FnMut(&PublishRequest) + Send + 'static)
{
    let store: Arc<Mutex<Vec<PublishRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&store);
    (store, move |request: &PublishRequest| {
        writer.lock().unwrap().push(request.clone())
    })
}

fn error_sink() -> (Arc<Mutex<Vec<ErrorKind>>>, impl FnMut(&Error) + Send + 'static) {
    let store: Arc<Mutex<Vec<ErrorKind>>> = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&store);
    (store, move |error: &Error| {
        writer.lock().unwrap().push(kind(error))
    })
}

#[test]
fn test_established_registration_reports_published() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (published, on_published) = publish_sink();
    publisher.connect_service_published(on_published);

    // 1. Commit the registration.
    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    assert!(publisher.is_active());
    assert_eq!(provider.publish_commits(), 1);
    let committed = provider.committed();
    assert_eq!(committed[0].name, "MyPrinter");
    assert_eq!(committed[0].port, 631);

    // 2. The group walks through registering to established.
    provider.group_transition(GroupState::Registering);
    publisher.poll();
    assert!(published.lock().unwrap().is_empty(), "registering is transient");

    provider.group_transition(GroupState::Established);
    publisher.poll();

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].name, "MyPrinter");
    assert_eq!(published[0].service_type, "_ipp._tcp");
    assert_eq!(published[0].domain, "local");
    assert_eq!(published[0].port, 631);

    // 3. Still active until the caller stops it.
    assert!(publisher.is_active());
    publisher.stop();
    assert!(!publisher.is_active());
    assert_eq!(provider.publish_releases(), 1);
}

#[test]
fn test_collision_resets_and_reports_name_collision() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (published, on_published) = publish_sink();
    let (errors, on_error) = error_sink();
    publisher.connect_service_published(on_published);
    publisher.connect_error(on_error);

    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    provider.group_transition(GroupState::Collision);
    publisher.poll();

    // Exactly one collision error, no publish success, engine inactive.
    assert_eq!(*errors.lock().unwrap(), vec![ErrorKind::NameCollision]);
    assert!(published.lock().unwrap().is_empty());
    assert!(!publisher.is_active());
    assert!(publisher.current().is_none());
    assert_eq!(provider.publish_releases(), 1);
}

#[test]
fn test_rename_and_retry_after_collision() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (published, on_published) = publish_sink();
    publisher.connect_service_published(on_published);

    // 1. First name collides.
    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    provider.group_transition(GroupState::Collision);
    publisher.poll();
    assert!(!publisher.is_active());

    // 2. The caller picks a new name; no automatic retry happened in
    //    between.
    assert_eq!(provider.publish_commits(), 1);
    publisher.start("MyPrinter (2)", "_ipp._tcp", "local", 631).unwrap();
    provider.group_transition(GroupState::Established);
    publisher.poll();

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].name, "MyPrinter (2)");
}

#[test]
fn test_group_failure_resets_and_reports_registration_failed() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (errors, on_error) = error_sink();
    publisher.connect_error(on_error);

    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    provider.group_transition(GroupState::Registering);
    publisher.poll();
    provider.group_transition(GroupState::Failure);
    publisher.poll();

    assert_eq!(*errors.lock().unwrap(), vec![ErrorKind::RegistrationFailed]);
    assert!(!publisher.is_active());
    assert_eq!(provider.publish_releases(), 1);
}

#[test]
fn test_second_start_rejected_while_active() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());

    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    let second = publisher.start("OtherPrinter", "_ipp._tcp", "local", 632);
    assert!(matches!(second, Err(Error::RegistrationFailed { .. })));

    // The active registration is untouched.
    assert!(publisher.is_active());
    assert_eq!(publisher.current().unwrap().name, "MyPrinter");
    assert_eq!(provider.publish_commits(), 1);
    assert_eq!(provider.publish_releases(), 0);
}

#[test]
fn test_rejected_commit_leaves_publisher_inactive() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (errors, on_error) = error_sink();
    publisher.connect_error(on_error);

    provider.set_fail_publish_commit(true);
    let result = publisher.start("MyPrinter", "_ipp._tcp", "local", 631);
    assert!(matches!(result, Err(Error::RegistrationFailed { .. })));
    assert!(!publisher.is_active());
    assert!(publisher.current().is_none());

    // The failure came back on the call, not through the observers, and
    // there is nothing to release.
    publisher.poll();
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(provider.publish_releases(), 0);

    // A later attempt works again.
    provider.set_fail_publish_commit(false);
    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    assert!(publisher.is_active());
}

#[test]
fn test_stop_discards_queued_group_events() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (published, on_published) = publish_sink();
    publisher.connect_service_published(on_published);

    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
    // Established is queued but the caller stops first.
    provider.group_transition(GroupState::Established);
    publisher.stop();
    publisher.poll();

    assert!(published.lock().unwrap().is_empty());
    assert!(!publisher.is_active());
    assert_eq!(provider.publish_releases(), 1);

    // Stop stays idempotent.
    publisher.stop();
    assert_eq!(provider.publish_releases(), 1);
}

#[test]
fn test_group_events_from_another_thread() {
    let provider = Arc::new(MockProvider::new());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (published, on_published) = publish_sink();
    publisher.connect_service_published(on_published);

    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();

    // Backend thread reports the lifecycle with some delay.
    let producer_provider = Arc::clone(&provider);
    let producer = thread::spawn(move || {
        producer_provider.group_transition(GroupState::Registering);
        thread::sleep(Duration::from_millis(20));
        producer_provider.group_transition(GroupState::Established);
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while published.lock().unwrap().is_empty() {
        if Instant::now() >= deadline {
            panic!("no ServicePublished within deadline");
        }
        publisher.poll();
        thread::sleep(Duration::from_millis(5));
    }
    producer.join().unwrap();

    assert_eq!(published.lock().unwrap().len(), 1);
    assert!(publisher.is_active());
}

#[test]
fn test_browser_and_publisher_bridges_are_independent() {
    use zeroconf_bridge::{Protocol, ServiceBrowser};

    let provider = Arc::new(MockProvider::new());
    let mut browser = ServiceBrowser::new(provider.clone());
    let mut publisher = ServicePublisher::new(provider.clone());
    let (added, on_added) = {
        let store: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&store);
        (store, move |record: &zeroconf_bridge::ServiceRecord| {
            writer.lock().unwrap().push(record.name.clone())
        })
    };
    let (published, on_published) = publish_sink();
    browser.connect_service_added(on_added);
    publisher.connect_service_published(on_published);

    browser.start("_http._tcp").unwrap();
    publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();

    // Events for both engines are queued; each poll only drains its own
    // bridge.
    provider.announce("printer1", "_http._tcp", "local", 3);
    provider.group_transition(GroupState::Established);

    publisher.poll();
    assert_eq!(published.lock().unwrap().len(), 1);
    assert!(added.lock().unwrap().is_empty(), "browser events stay queued");

    browser.poll();
    provider.complete_resolve("printer1.local", "192.168.1.5", 9100, Protocol::V4);
    browser.poll();
    assert_eq!(*added.lock().unwrap(), vec!["printer1".to_string()]);
}
