//! Integration tests for the binding facade contract.
//!
//! Every test drives `Ria` over `MockEngine`, so no script files or network
//! access are needed.

use std::sync::Arc;
use std::thread;

use ria::registry::EngineHandle;
use ria::{ErrorKind, ExecStatus, MockConfig, MockEngine, Ria};

fn facade(config: MockConfig) -> Ria<MockEngine> {
    Ria::with_engine(Arc::new(MockEngine::new(config)))
}

#[test]
fn test_never_issued_handle_is_rejected_everywhere() {
    let mut ria = facade(MockConfig::new().with_result("a", "1"));
    let bogus = EngineHandle::from_raw(4242).unwrap();

    assert_eq!(ria.load_script("script.scr", bogus).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(ria.execute("a", None, bogus).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(ria.last_error_message(bogus).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(ria.shutdown(bogus).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(ria.status, ExecStatus::Failed);
}

#[test]
fn test_failed_execute_sets_failed_status_and_error_text() {
    let mut ria = facade(MockConfig::new().with_failure("query_cities", "site unreachable"));
    let h = ria.initialize("/tmp").unwrap();
    ria.load_script("script.scr", h).unwrap();

    assert!(ria.execute("query_cities", None, h).is_err());
    assert_eq!(ria.status, ExecStatus::Failed);
    assert_eq!(ria.status.code(), 2);
    assert_eq!(ria.result, "");
    let message = ria.last_error_message(h).unwrap();
    assert!(!message.is_empty());
    assert!(message.contains("site unreachable"));
}

#[test]
fn test_successful_execute_sets_ok_status_and_result() {
    let mut ria = facade(MockConfig::new().with_result("Greeting", "hello"));
    let h = ria.initialize("/tmp").unwrap();
    ria.load_script("script.scr", h).unwrap();

    let value = ria.execute("greeting", Some(&["x", "y"][..]), h).unwrap();
    assert_eq!(value, "hello");
    assert_eq!(ria.status, ExecStatus::Ok);
    assert_eq!(ria.status.code(), 1);
    assert_eq!(ria.result, "hello");
}

#[test]
fn test_double_shutdown_reports_already_shutdown() {
    let mut ria = facade(MockConfig::new().with_result("a", "1"));
    let h = ria.initialize("/tmp").unwrap();
    ria.shutdown(h).unwrap();

    assert_eq!(ria.shutdown(h).unwrap_err().kind(), ErrorKind::AlreadyShutdown);
    assert_eq!(ria.execute("a", None, h).unwrap_err().kind(), ErrorKind::AlreadyShutdown);
    assert_eq!(ria.last_error_message(h).unwrap_err().kind(), ErrorKind::AlreadyShutdown);
}

#[test]
fn test_handles_are_distinct_and_never_reused() {
    let ria = facade(MockConfig::new());
    let first = ria.initialize("/tmp").unwrap();
    ria.shutdown(first).unwrap();
    let second = ria.initialize("/tmp").unwrap();
    assert_ne!(first, second);
    assert!(second.get() > first.get());
}

#[test]
fn test_city_listing_end_to_end() {
    let mut ria = facade(
        MockConfig::new()
            .with_result("query_cities", "3")
            .with_sequence("get_next_city_url", ["CityA", "CityB", "CityC"]),
    );
    let h = ria.initialize("/tmp").unwrap();
    ria.load_script("script.scr", h).unwrap();
    ria.execute("query_cities", None, h).unwrap();

    let mut screen = String::new();
    for _ in 0..3 {
        ria.execute("get_next_city_url", None, h).unwrap();
        screen.push_str(&ria.result);
        screen.push('\n');
    }
    assert_eq!(screen, "CityA\nCityB\nCityC\n");
    assert_eq!(ria.last_error_message(h).unwrap(), "");
    assert!(ria.shutdown(h).is_ok());
}

#[test]
fn test_concurrent_callers_on_separate_handles() {
    let engine = Arc::new(MockEngine::new(MockConfig::new().with_sequence("next", ["1", "2", "3", "4"])));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut ria = Ria::with_engine(engine);
                let h = ria.initialize("/tmp").unwrap();
                ria.load_script("script.scr", h).unwrap();
                let values: Vec<String> = (0..4).map(|_| ria.execute("next", None, h).unwrap()).collect();
                ria.shutdown(h).unwrap();
                values
            })
        })
        .collect();
    for worker in workers {
        // cursors are per handle, so every thread sees the whole sequence
        assert_eq!(worker.join().unwrap(), vec!["1", "2", "3", "4"]);
    }
}
