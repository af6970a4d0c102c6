use duelbox::{FailureKind, ResourceLimits, Sandbox, TestStatus};

use super::test_config;

const CORRECT_PALINDROME: &str = "def is_palindrome(s):\n    s = s.replace(' ', '').lower()\n    return s == s[::-1]\n";

#[tokio::test]
async fn full_pass_on_correct_solution() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let result = sandbox
        .execute(CORRECT_PALINDROME, &challenge, None)
        .await
        .expect("execution failed");

    assert!(result.success);
    assert_eq!(result.failure, FailureKind::None);
    assert_eq!(result.passed, 5);
    assert_eq!(result.total, 5);
    assert!(result.is_full_pass());
    assert_eq!(result.tests.len(), 5);
    assert!(result.tests.iter().all(|t| t.status == TestStatus::Pass));
}

#[tokio::test]
async fn partial_pass_reports_failing_cases() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    // Always claiming palindrome fails only the "hello" case
    let result = sandbox
        .execute("def is_palindrome(s):\n    return True\n", &challenge, None)
        .await
        .expect("execution failed");

    assert!(result.success);
    assert_eq!(result.passed, 4);
    assert_eq!(result.total, 5);
    assert!(!result.is_full_pass());

    let failing = result
        .tests
        .iter()
        .find(|t| t.status == TestStatus::Fail)
        .expect("one case must fail");
    assert_eq!(failing.index, 2);
    assert_eq!(failing.expected.as_deref(), Some("False"));
    assert_eq!(failing.got.as_deref(), Some("True"));
}

#[tokio::test]
async fn per_test_exception_does_not_abort_the_run() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let code = "def is_palindrome(s):\n    if s == 'hello':\n        raise ValueError('boom')\n    s = s.replace(' ', '').lower()\n    return s == s[::-1]\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    // One case errored; the other four still ran and passed
    assert!(result.success);
    assert_eq!(result.passed, 4);
    let errored = result
        .tests
        .iter()
        .find(|t| t.status == TestStatus::Error)
        .expect("one case must error");
    assert_eq!(errored.index, 2);
    assert!(errored.detail.as_deref().unwrap().contains("ValueError"));
}

#[tokio::test]
async fn module_level_raise_is_a_runtime_error() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let code = "def is_palindrome(s):\n    return True\nraise RuntimeError('setup exploded')\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    assert_eq!(result.failure, FailureKind::RuntimeError);
    assert_eq!(result.passed, 0);
    assert_eq!(result.total, 5);
    assert!(result.diagnostic.as_deref().unwrap().contains("RuntimeError"));
}

#[tokio::test]
async fn missing_entry_point_is_a_runtime_error() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let result = sandbox
        .execute("def wrong_name(s):\n    return True\n", &challenge, None)
        .await
        .expect("execution failed");

    assert_eq!(result.failure, FailureKind::RuntimeError);
    assert_eq!(result.passed, 0);
    assert!(
        result
            .diagnostic
            .as_deref()
            .unwrap()
            .contains("is_palindrome")
    );
}

#[tokio::test]
async fn syntax_error_is_rejected_before_spawning() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let result = sandbox
        .execute("def broken(:\n    pass\n", &challenge, None)
        .await
        .expect("execution failed");

    // The validator fails closed on unparseable source
    assert_eq!(result.failure, FailureKind::ForbiddenConstruct);
    assert_eq!(result.passed, 0);
}

#[tokio::test]
async fn denied_import_never_executes() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let result = sandbox
        .execute(
            "import os\ndef is_palindrome(s):\n    return True\n",
            &challenge,
            None,
        )
        .await
        .expect("execution failed");

    assert_eq!(result.failure, FailureKind::ForbiddenConstruct);
    assert_eq!(result.passed, 0);
    assert_eq!(result.total, 5);
}

#[tokio::test]
async fn infinite_loop_times_out_with_zero_passed() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let limits = ResourceLimits::none().with_wall_time_limit(1.0);
    let started = std::time::Instant::now();
    let result = sandbox
        .execute(
            "def is_palindrome(s):\n    while True:\n        pass\n",
            &challenge,
            Some(&limits),
        )
        .await
        .expect("execution failed");

    assert_eq!(result.failure, FailureKind::Timeout);
    assert_eq!(result.passed, 0);
    assert_eq!(result.total, 5);
    // The group kill fires at the budget, not at the default five seconds
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
}

#[tokio::test]
async fn runaway_printing_is_bounded_and_malformed() {
    let config = test_config();
    let challenge = config.get_challenge("palindrome").unwrap().clone();
    let sandbox = Sandbox::new(config);

    // Floods stdout far past the capture cap, burying the report
    let code = "def is_palindrome(s):\n    print('x' * 1000000)\n    return True\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    assert_eq!(result.failure, FailureKind::MalformedOutput);
    assert_eq!(result.passed, 0);
}

#[tokio::test]
async fn splatted_arguments_reach_the_entry_point() {
    let config = test_config();
    let challenge = config.get_challenge("two_sum").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let code = "def two_sum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n    return []\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    assert!(result.is_full_pass(), "result: {result:?}");
}

#[tokio::test]
async fn list_results_compare_structurally() {
    let config = test_config();
    let challenge = config.get_challenge("fizzbuzz").unwrap().clone();
    let sandbox = Sandbox::new(config);

    let code = "def fizzbuzz(n):\n    out = []\n    for i in range(1, n + 1):\n        if i % 15 == 0:\n            out.append('FizzBuzz')\n        elif i % 3 == 0:\n            out.append('Fizz')\n        elif i % 5 == 0:\n            out.append('Buzz')\n        else:\n            out.append(str(i))\n    return out\n";
    let result = sandbox
        .execute(code, &challenge, None)
        .await
        .expect("execution failed");

    assert!(result.is_full_pass(), "result: {result:?}");
}
