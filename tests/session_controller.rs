mod common;

#[cfg(unix)]
mod session_controller {
    use super::common::{
        collect_until_final, fast_config, output_text, process_exists, status_of, stays_quiet,
        still_running_after,
    };
    use std::error::Error;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use termexec::process::AllowListClassifier;
    use termexec::{SessionController, SessionEvent, SessionState};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn controller() -> SessionController {
        SessionController::new(&fast_config())
    }

    #[test]
    fn echo_streams_one_line_then_succeeds() -> Result<(), Box<dyn Error>> {
        let controller = controller();
        assert!(controller.start("echo hello"));

        let events = collect_until_final(&controller, TIMEOUT);
        let outputs: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Output(_)))
            .collect();
        assert_eq!(outputs, vec![&SessionEvent::Output("hello\n".to_string())]);

        let (success, message) = status_of(&events).ok_or("expected exactly one status")?;
        assert!(success);
        assert!(message.contains("Return code: 0"), "{message}");
        assert!(message.contains("Execution time:"), "{message}");

        let n = events.len();
        assert!(events[n - 2].is_status());
        assert_eq!(events[n - 1], SessionEvent::Progress(1.0));

        assert!(stays_quiet(&controller, Duration::from_millis(200)));
        assert!(!controller.is_running());
        assert_eq!(controller.state(), SessionState::Terminated);
        assert_eq!(controller.accumulated_output(), "hello\n");
        Ok(())
    }

    #[test]
    fn failing_command_reports_return_code() -> Result<(), Box<dyn Error>> {
        let controller = controller();
        assert!(controller.start("false"));

        let events = collect_until_final(&controller, TIMEOUT);
        let (success, message) = status_of(&events).ok_or("expected exactly one status")?;
        assert!(!success);
        assert!(message.contains("Return code: 1"), "{message}");
        assert!(events.last().is_some_and(SessionEvent::is_final));

        let history = controller.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].return_code, Some(1));
        assert!(!history[0].stopped);
        Ok(())
    }

    #[test]
    fn stderr_lines_are_prefixed() {
        let controller = controller();
        assert!(controller.start("echo out; echo oops 1>&2"));

        let events = collect_until_final(&controller, TIMEOUT);
        let text = output_text(&events);
        assert!(text.contains("out\n"), "{text:?}");
        assert!(text.contains("ERROR: oops\n"), "{text:?}");
    }

    #[test]
    fn progress_rises_and_nothing_follows_status() {
        let mut config = fast_config();
        config.engine.progress_horizon_secs = 0.5;
        let controller = SessionController::new(&config);
        assert!(controller.start("sleep 0.3; echo done"));

        let events = collect_until_final(&controller, TIMEOUT);
        let progress: Vec<f64> = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(progress.len() >= 2, "{progress:?}");
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{progress:?}");
        assert!(progress[..progress.len() - 1].iter().all(|p| *p < 1.0));
        assert_eq!(progress.last(), Some(&1.0));

        let status_at = events
            .iter()
            .position(SessionEvent::is_status)
            .expect("status event");
        assert_eq!(events.len(), status_at + 2);
    }

    #[test]
    fn stop_terminates_long_running_command() -> Result<(), Box<dyn Error>> {
        let controller = controller();
        assert!(controller.start("sleep 5"));
        thread::sleep(Duration::from_millis(100));
        let pid = controller.current_pid().ok_or("pid while running")?;
        assert!(controller.is_running());

        let start = Instant::now();
        controller.stop();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!controller.is_running());
        assert!(!process_exists(pid));

        let events = collect_until_final(&controller, TIMEOUT);
        let (success, message) = status_of(&events).ok_or("expected exactly one status")?;
        assert!(!success);
        assert!(message.contains("terminated"), "{message}");
        assert!(events.last().is_some_and(SessionEvent::is_final));

        let history = controller.history();
        assert!(history[0].stopped);
        assert_eq!(history[0].return_code, Some(128 + libc::SIGTERM));
        Ok(())
    }

    #[test]
    fn stop_reaches_the_whole_process_group() -> Result<(), Box<dyn Error>> {
        let controller = controller();
        assert!(controller.start("sleep 5 & sleep 5; wait"));
        thread::sleep(Duration::from_millis(150));

        let start = Instant::now();
        controller.stop();
        assert!(start.elapsed() < Duration::from_secs(3));
        let events = collect_until_final(&controller, TIMEOUT);
        assert!(status_of(&events).is_some());
        Ok(())
    }

    #[test]
    fn background_job_does_not_outlive_natural_exit() -> Result<(), Box<dyn Error>> {
        let controller = controller();
        assert!(controller.start("sleep 30 >/dev/null 2>&1 & echo $!"));

        let start = Instant::now();
        let events = collect_until_final(&controller, TIMEOUT);
        assert!(start.elapsed() < Duration::from_secs(5));
        let (success, message) = status_of(&events).ok_or("expected exactly one status")?;
        assert!(success, "{message}");
        assert!(!controller.history()[0].stopped);

        let pid: u32 = output_text(&events).trim().parse()?;
        assert!(!still_running_after(pid, Duration::from_secs(2)));
        Ok(())
    }

    #[test]
    fn stop_is_idempotent() {
        let controller = controller();
        controller.stop();
        assert!(controller.next_event(Duration::from_millis(50)).is_err());

        assert!(controller.start("sleep 5"));
        controller.stop();
        controller.stop();
        let events = collect_until_final(&controller, TIMEOUT);
        assert_eq!(events.iter().filter(|event| event.is_status()).count(), 1);
        assert!(stays_quiet(&controller, Duration::from_millis(200)));
    }

    #[test]
    fn second_start_is_refused_while_running() {
        let controller = controller();
        assert!(controller.start("sleep 5"));
        assert!(!controller.start("echo nope"));
        assert_eq!(controller.current_command().as_deref(), Some("sleep 5"));
        controller.stop();
    }

    #[test]
    fn empty_command_is_rejected_with_error() {
        let controller = controller();
        assert!(!controller.start("   "));
        match controller.next_event(Duration::from_millis(200)) {
            Ok(SessionEvent::Error(message)) => assert_eq!(message, "Please enter a command"),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn input_is_refused_for_non_interactive_session() {
        let controller = controller();
        assert!(!controller.send_input("hello"));
        assert!(matches!(
            controller.next_event(Duration::from_millis(200)),
            Ok(SessionEvent::Error(message)) if message.starts_with("Failed to send input")
        ));

        assert!(controller.start("sleep 5"));
        assert!(!controller.is_interactive());
        assert!(!controller.send_input("hello"));
        controller.stop();
    }

    #[test]
    fn controller_is_reusable_after_completion() {
        let controller = controller();
        assert!(controller.start("echo first"));
        collect_until_final(&controller, TIMEOUT);
        assert!(controller.start("echo second"));
        collect_until_final(&controller, TIMEOUT);

        assert_eq!(controller.accumulated_output(), "second\n");
        let commands: Vec<_> = controller
            .history()
            .into_iter()
            .map(|record| record.command)
            .collect();
        assert_eq!(commands, vec!["echo first", "echo second"]);
    }

    #[test]
    fn interactive_launch_failure_reports_error_then_status() {
        let program = "definitely-not-a-real-binary-4711";
        let classifier = Arc::new(AllowListClassifier::new([program]));
        let controller = SessionController::with_classifier(&fast_config(), classifier);
        assert!(!controller.start(program));

        let events = collect_until_final(&controller, TIMEOUT);
        assert!(matches!(&events[0], SessionEvent::Error(message) if message.contains(program)));
        assert!(matches!(&events[1], SessionEvent::Status { success: false, .. }));
        assert!(events[2].is_final());
        assert_eq!(controller.state(), SessionState::Terminated);
        assert!(!controller.is_interactive());
        assert_eq!(controller.history()[0].return_code, None);

        assert!(controller.start("echo recovered"));
        let events = collect_until_final(&controller, TIMEOUT);
        assert_eq!(output_text(&events), "recovered\n");
    }

    #[test]
    fn dropping_the_controller_stops_the_session() -> Result<(), Box<dyn Error>> {
        let controller = controller();
        assert!(controller.start("sleep 5"));
        thread::sleep(Duration::from_millis(100));
        let pid = controller.current_pid().ok_or("pid while running")?;
        drop(controller);
        assert!(!process_exists(pid));
        Ok(())
    }

    #[test]
    fn stop_from_another_thread_then_restart() {
        let controller = Arc::new(controller());
        assert!(controller.start("sleep 5"));

        let stopper = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.stop())
        };
        stopper.join().expect("stopper thread");
        assert!(!controller.is_running());
        assert!(status_of(&collect_until_final(&controller, TIMEOUT)).is_some());

        assert!(controller.start("echo after"));
        let events = collect_until_final(&controller, TIMEOUT);
        assert!(output_text(&events).contains("after\n"));
    }
}
