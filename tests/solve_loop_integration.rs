//! 求解循环集成测试：脚本化 Mock 神谕驱动完整多轮协议

use std::sync::Arc;
use std::time::Duration;

use gauss::llm::MockLlmClient;
use gauss::solve::{ProblemStatement, SessionStatus, SolveLoop, SolveOptions};
use gauss::verify::Verifier;

fn solver_with(responses: Vec<&str>, max_rounds: u32) -> SolveLoop {
    SolveLoop::new(
        Arc::new(MockLlmClient::with_responses(responses)),
        Verifier::default(),
        SolveOptions {
            max_rounds,
            round_timeout: Duration::from_secs(5),
            structured: false,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn trig_problem_solved_in_one_round() {
    let solver = solver_with(vec![r#"{"final_answer": "1/2", "approach": "unit circle"}"#], 3);
    let session = solver.run(ProblemStatement::new("What is sin(30°)?")).await;

    assert_eq!(session.status(), SessionStatus::Solved);
    assert_eq!(session.final_answer(), Some("1/2"));
    assert_eq!(session.rounds().len(), 1);

    let verdict = session.rounds()[0].verdict.as_ref().unwrap();
    assert!(verdict.is_valid);
    assert_eq!(verdict.numeric_value.as_deref(), Some("1/2"));
}

#[tokio::test]
async fn quadratic_self_corrected_in_two_rounds() {
    // 第 1 轮漏掉第二个根；验证器用多项式降次查出缺根，
    // 反馈后第 2 轮补全并通过
    let solver = solver_with(
        vec![
            r#"{"final_answer": "x=-2"}"#,
            r#"{"final_answer": "x=-2, x=-3"}"#,
        ],
        3,
    );
    let session = solver.run(ProblemStatement::new("Solve x^2+5x+6=0")).await;

    assert_eq!(session.status(), SessionStatus::Solved);
    assert_eq!(session.final_answer(), Some("x = -3, x = -2"));
    assert_eq!(session.rounds().len(), 2);

    let first = session.rounds()[0].verdict.as_ref().unwrap();
    assert!(!first.is_valid);
    assert_eq!(
        first.failure_reason,
        Some(gauss::verify::FailureReason::NotEquivalent)
    );

    // 第 2 轮提示必须携带具体缺陷，而非笼统的「再试一次」
    let second_prompt = &session.rounds()[1].prompt;
    assert!(second_prompt.contains("rejected by symbolic verification"));
    assert!(second_prompt.contains("factor remains"));
}

#[tokio::test]
async fn prose_wrapped_json_repaired_and_solved() {
    let solver = solver_with(
        vec!["The answer is: ```json\n{\"final_answer\": \"1/2\"}\n``` Hope that helps!"],
        3,
    );
    let session = solver.run(ProblemStatement::new("What is sin(30°)?")).await;

    assert_eq!(session.status(), SessionStatus::Solved);
    assert_eq!(session.final_answer(), Some("1/2"));
}

#[tokio::test]
async fn unverifiable_answer_exhausts_single_round_budget() {
    let solver = solver_with(vec![r#"{"final_answer": "x=1"}"#], 1);
    let session = solver.run(ProblemStatement::new("Solve x^2+5x+6=0")).await;

    assert_eq!(session.status(), SessionStatus::Exhausted);
    assert_eq!(session.rounds().len(), 1);
    // 尽力答案保留，但状态与 solved 可区分
    assert_eq!(session.final_answer(), Some("x=1"));
}

#[tokio::test]
async fn failed_rounds_stay_in_the_trace() {
    let solver = solver_with(
        vec![
            "no json at all",
            r#"{"final_answer": "one half"}"#,
            r#"{"final_answer": "1/2"}"#,
        ],
        3,
    );
    let session = solver.run(ProblemStatement::new("What is sin(30°)?")).await;

    assert_eq!(session.status(), SessionStatus::Solved);
    assert_eq!(session.rounds().len(), 3);

    // 轨迹完整：解析失败轮（无候选）、归一化失败轮（有候选、裁定 unparsable）、成功轮
    assert!(session.rounds()[0].candidate.is_none());
    assert!(session.rounds()[0].verdict.is_none());

    let second = &session.rounds()[1];
    assert!(second.candidate.is_some());
    assert_eq!(
        second.verdict.as_ref().unwrap().failure_reason,
        Some(gauss::verify::FailureReason::Unparsable)
    );

    assert!(session.rounds()[2].verdict.as_ref().unwrap().is_valid);
}

#[tokio::test]
async fn sessions_are_independent_and_parallel() {
    // 并发会话各自持有轨迹，互不串扰
    let mut handles = Vec::new();
    for _ in 0..8 {
        let solver = solver_with(vec![r#"{"final_answer": "1/2"}"#], 2);
        handles.push(tokio::spawn(async move {
            solver.run(ProblemStatement::new("What is sin(30°)?")).await
        }));
    }
    for handle in handles {
        let session = handle.await.unwrap();
        assert_eq!(session.status(), SessionStatus::Solved);
        assert_eq!(session.rounds().len(), 1);
    }
}
