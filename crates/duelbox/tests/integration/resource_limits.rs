use duelbox::{FailureKind, ResourceLimits, Sandbox, TestStatus};

use super::test_config;

#[tokio::test]
async fn oversized_allocation_cannot_pass() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    // Tries to allocate well past the 128 MiB address-space ceiling. The
    // interpreter either raises MemoryError per test or dies to the limit;
    // both roads end at zero passed tests.
    let code = "def is_palindrome(s):\n    hog = 'x' * (512 * 1024 * 1024)\n    return True\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    assert_eq!(result.passed, 0);
    match result.failure {
        FailureKind::None => {
            // MemoryError was caught per test and reported as errors
            assert!(result.tests.iter().all(|t| t.status == TestStatus::Error));
        }
        FailureKind::ResourceExceeded | FailureKind::MalformedOutput => {}
        other => panic!("unexpected failure kind: {other:?}"),
    }
}

#[tokio::test]
async fn cpu_spin_hits_the_cpu_ceiling() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    // One second of CPU allowed, eight of wall: the CPU limit fires first
    // and the kernel kills the child
    let limits = ResourceLimits::none()
        .with_cpu_time_limit(1.0)
        .with_wall_time_limit(8.0);
    let code = "def is_palindrome(s):\n    n = 0\n    while True:\n        n += 1\n";
    let result = sandbox
        .execute(code, &challenge, Some(&limits))
        .await
        .expect("execution failed");

    assert_eq!(result.failure, FailureKind::ResourceExceeded);
    assert_eq!(result.passed, 0);
    assert_eq!(result.total, 5);
}

#[tokio::test]
async fn per_challenge_limit_overrides_apply() {
    let config = test_config();
    // The collatz challenge widens its wall clock in the example config
    let challenge = config.get_challenge("collatz").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let code = "def collatz_steps(n):\n    steps = 0\n    while n != 1:\n        n = n // 2 if n % 2 == 0 else 3 * n + 1\n        steps += 1\n    return steps\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    assert!(result.is_full_pass(), "result: {result:?}");
}
