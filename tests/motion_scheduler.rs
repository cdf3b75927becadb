// Integration tests for keyframe scheduling and interpolation timing

use gesture_rs::command::{CommandDecoder, Keyframe, MotionCommand};
use gesture_rs::config::GroupConfig;
use gesture_rs::hardware::{build_groups, Actuator, ActuatorGroup, HardwareError, ServoJournal, ServoWrite, SimulatedServo};
use gesture_rs::motion::{InterpolationPolicy, MotionError, MotionScheduler, NativeSmoothing, SoftwareStep};
use tokio::time::{Duration, Instant};

const STEP: Duration = Duration::from_millis(2);

fn left_arm_groups(journal: &ServoJournal) -> Vec<ActuatorGroup> {
    build_groups(
        &[
            GroupConfig::new("L", &[12, 14, 27, 26, 25]),
            GroupConfig::new("LW", &[32, 33]),
            GroupConfig::new("LE", &[22]),
            GroupConfig::new("LS", &[23, 24]),
        ],
        90,
        |_, pin| Box::new(SimulatedServo::new(pin).with_journal(journal.clone())),
    )
    .unwrap()
}

fn left_arm_decoder() -> CommandDecoder {
    CommandDecoder::new(vec![
        ("L".to_string(), 5),
        ("LW".to_string(), 2),
        ("LE".to_string(), 1),
        ("LS".to_string(), 2),
    ])
}

fn scheduler(policy: Box<dyn InterpolationPolicy>) -> (MotionScheduler, ServoJournal) {
    let journal = ServoJournal::default();
    let groups = left_arm_groups(&journal);
    journal.clear();
    (MotionScheduler::new(groups, policy), journal)
}

/// Timer wheel granularity is 1ms; each sleep may round up by at most that.
fn assert_elapsed(elapsed: Duration, expected: Duration, sleeps: u32) {
    assert!(elapsed >= expected, "elapsed {:?} < expected {:?}", elapsed, expected);
    assert!(
        elapsed <= expected + Duration::from_millis(sleeps as u64),
        "elapsed {:?} too far past expected {:?}",
        elapsed,
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn software_step_single_hand_keyframe() {
    let (mut s, journal) = scheduler(Box::new(SoftwareStep::new(STEP)));
    let cmd = left_arm_decoder()
        .decode(r#"{"token":"A","duration":1.0,"keyframes":[{"L":[0,45,90,135,180]}]}"#)
        .unwrap();

    let start = Instant::now();
    let report = s.run(cmd).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.token, "A");
    assert_eq!(report.steps, vec![90]);
    assert_elapsed(elapsed, STEP * 90 + Duration::from_secs(1), 91);
    assert_eq!(s.group("L").unwrap().last_angles(), &[0, 45, 90, 135, 180]);
    // Untouched groups keep their neutral position and receive no writes
    assert_eq!(s.group("LW").unwrap().last_angles(), &[90, 90]);
    assert!(journal.angles_for(32).is_empty());

    // Every addressed joint is written once per step
    let joint0 = journal.angles_for(12);
    assert_eq!(joint0.len(), 90);
    assert_eq!(joint0.first(), Some(&89));
    assert_eq!(joint0.last(), Some(&0));
    // Joint 2 has no delta and holds from the first step
    assert!(journal.angles_for(27).iter().all(|&a| a == 90));
    // Joint 1 reaches 45 after 45 steps, then holds
    let joint1 = journal.angles_for(14);
    assert_eq!(joint1[44], 45);
    assert!(joint1[44..].iter().all(|&a| a == 45));
    // One degree per step, never overshooting
    for pair in joint0.windows(2) {
        assert_eq!(pair[0] - pair[1], 1);
    }
}

#[tokio::test(start_paused = true)]
async fn largest_delta_across_groups_governs_stepping() {
    let (mut s, journal) = scheduler(Box::new(SoftwareStep::new(STEP)));
    let cmd = MotionCommand::new(
        "SYNC",
        0.5,
        vec![Keyframe::new()
            .with_group("L", &[80, 90, 90, 90, 90])
            .with_group("LE", &[150])
            .with_group("LS", &[70, 100])],
    );
    let start = Instant::now();
    let report = s.run(cmd).await.unwrap();
    assert_eq!(report.steps, vec![60]);
    assert_elapsed(start.elapsed(), STEP * 60 + Duration::from_millis(500), 61);

    // All joints start on the first step together
    assert_eq!(journal.angles_for(12)[0], 89);
    assert_eq!(journal.angles_for(22)[0], 91);
    assert_eq!(journal.angles_for(23)[0], 89);
    // Smaller deltas finish early and hold until the slowest joint is done
    assert_eq!(journal.angles_for(12)[9..].iter().collect::<std::collections::HashSet<_>>().len(), 1);
    assert_eq!(journal.angles_for(22).len(), 60);
    assert_eq!(s.group("LS").unwrap().last_angles(), &[70, 100]);
}

#[tokio::test(start_paused = true)]
async fn keyframes_chain_from_committed_targets() {
    let (mut s, journal) = scheduler(Box::new(SoftwareStep::new(STEP)));
    let cmd = MotionCommand::new(
        "CHAIN",
        1.0,
        vec![
            Keyframe::new().with_group("LE", &[100]),
            Keyframe::new().with_group("LW", &[95, 85]),
            Keyframe::new().with_group("LE", &[97]),
        ],
    );
    let start = Instant::now();
    let report = s.run(cmd).await.unwrap();
    assert_eq!(report.keyframes, 3);
    assert_eq!(report.steps, vec![10, 5, 3]);
    let hold = Duration::from_secs_f64(1.0 / 3.0);
    assert_elapsed(start.elapsed(), STEP * 18 + hold * 3, 21);

    // The third keyframe starts where the first one left the elbow
    let elbow = journal.angles_for(22);
    assert_eq!(elbow.len(), 13);
    assert_eq!(&elbow[10..], &[99, 98, 97]);
    assert_eq!(s.group("LE").unwrap().last_angles(), &[97]);
    assert_eq!(s.group("LW").unwrap().last_angles(), &[95, 85]);
}

#[tokio::test(start_paused = true)]
async fn shape_mismatch_only_skips_that_group() {
    let (mut s, _journal) = scheduler(Box::new(SoftwareStep::new(STEP)));
    let cmd = left_arm_decoder()
        .decode(r#"{"token":"P","duration":0.2,"keyframes":[{"L":[1,2,3],"LE":[60]}]}"#)
        .unwrap();
    let report = s.run(cmd).await.unwrap();
    assert_eq!(report.steps, vec![30]);
    assert_eq!(s.group("L").unwrap().last_angles(), &[90, 90, 90, 90, 90]);
    assert_eq!(s.group("LE").unwrap().last_angles(), &[60]);
}

#[tokio::test(start_paused = true)]
async fn software_step_total_time_never_undercuts_duration() {
    let cases: &[(i32, i32, f64, usize)] = &[
        (90, 90, 1.0, 1),
        (90, 0, 0.25, 1),
        (90, 180, 2.0, 2),
        (10, 170, 0.1, 3),
        (45, 44, 1.5, 4),
    ];
    for &(start_angle, target, duration, frames) in cases {
        let journal = ServoJournal::default();
        let groups = build_groups(&[GroupConfig::new("LE", &[22])], start_angle, |_, pin| {
            Box::new(SimulatedServo::new(pin).with_journal(journal.clone()))
        })
        .unwrap();
        let mut s = MotionScheduler::new(groups, Box::new(SoftwareStep::new(STEP)));
        let keyframes = (0..frames).map(|_| Keyframe::new().with_group("LE", &[target])).collect();
        let cmd = MotionCommand::new("T", duration, keyframes);

        let started = Instant::now();
        let report = s.run(cmd).await.unwrap();
        let elapsed = started.elapsed();

        // Only the first keyframe moves; later ones start at the target already
        let max_steps = start_angle.abs_diff(target);
        let mut expected_steps = vec![0; frames];
        expected_steps[0] = max_steps;
        assert_eq!(report.steps, expected_steps);
        let hold = Duration::from_secs_f64(duration / frames as f64);
        let expected = STEP * max_steps + hold * frames as u32;
        assert_elapsed(elapsed, expected, max_steps + frames as u32);
        assert!(elapsed >= Duration::from_secs_f64(duration) - Duration::from_millis(1));
        assert_eq!(s.group("LE").unwrap().last_angles(), &[target]);
    }
}

#[tokio::test(start_paused = true)]
async fn native_smoothing_waits_exactly_the_duration() {
    let (mut s, journal) = scheduler(Box::new(NativeSmoothing::new(225)));
    let cmd = MotionCommand::new(
        "HELLO",
        1.0,
        vec![
            Keyframe::new().with_group("L", &[0, 0, 0, 0, 0]),
            Keyframe::new().with_group("L", &[180, 180, 180, 180, 180]),
            Keyframe::new().with_group("LE", &[10]),
            Keyframe::new(),
        ],
    );
    let start = Instant::now();
    let report = s.run(cmd).await.unwrap();
    assert_eq!(report.steps, vec![0, 0, 0, 0]);
    assert_elapsed(start.elapsed(), Duration::from_secs(1), 4);

    // One smooth move per actuator per addressed keyframe
    assert_eq!(
        journal.writes().iter().filter(|w| matches!(w, ServoWrite::Smooth { speed: 225, .. })).count(),
        11
    );
    assert_eq!(journal.angles_for(12), vec![0, 180]);
    assert_eq!(s.group("L").unwrap().last_angles(), &[180; 5]);
    assert_eq!(s.group("LE").unwrap().last_angles(), &[10]);
}

/// Servo that stops responding after a fixed number of writes.
struct FlakyServo {
    pin: u8,
    writes_left: u32,
}

impl Actuator for FlakyServo {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn attach(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn write(&mut self, _angle: i32) -> Result<(), HardwareError> {
        if self.writes_left == 0 {
            return Err(HardwareError::BusClosed);
        }
        self.writes_left -= 1;
        Ok(())
    }

    fn write_smooth(&mut self, angle: i32, _speed: u8) -> Result<(), HardwareError> {
        self.write(angle)
    }
}

#[tokio::test(start_paused = true)]
async fn hardware_failure_abandons_command() {
    let groups = build_groups(&[GroupConfig::new("LE", &[22])], 90, |_, pin| {
        Box::new(FlakyServo { pin, writes_left: 6 })
    })
    .unwrap();
    let mut s = MotionScheduler::new(groups, Box::new(SoftwareStep::new(STEP)));
    let cmd = MotionCommand::new(
        "X",
        0.1,
        vec![Keyframe::new().with_group("LE", &[93]), Keyframe::new().with_group("LE", &[80])],
    );
    // Attach used one write, the first keyframe three, the second fails on its third step
    let err = s.run(cmd).await.unwrap_err();
    assert!(matches!(err, MotionError::Hardware(HardwareError::BusClosed)));
    assert!(s.is_idle());
    assert_eq!(s.group("LE").unwrap().last_angles(), &[93]);
}
