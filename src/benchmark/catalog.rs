//! Standard benchmark test cases.

use crate::backend::TaskKind;

use super::types::{Category, TestCase};

pub fn chat_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "chat-greeting",
            "Simple greeting",
            TaskKind::Chat,
            "Hello! Can you tell me what the weather is usually like in spring?",
        )
        .with_description("Response to a basic greeting")
        .with_expected_output(100)
        .with_category(Category::Conversation),
        TestCase::new(
            "chat-technical",
            "Technical question",
            TaskKind::Chat,
            "Explain in detail the benefits of using the MVVM pattern in mobile app development.",
        )
        .with_description("Response to a technical question")
        .with_expected_output(300)
        .with_category(Category::Technical),
        TestCase::new(
            "chat-creative",
            "Creative prompt",
            TaskKind::Chat,
            "Write a short plot outline for a science fiction story set in a future Tokyo.",
        )
        .with_description("Response to a prompt that needs creativity")
        .with_expected_output(200)
        .with_category(Category::Creative),
        TestCase::new(
            "chat-long-form",
            "Long-form answer",
            TaskKind::Chat,
            "Describe the four seasons in Japan and the cultural meaning of each season in detail.",
        )
        .with_description("Ability to produce a long answer")
        .with_expected_output(500)
        .with_category(Category::General),
        TestCase::new(
            "chat-coding",
            "Coding help",
            TaskKind::Chat,
            "Show how to implement the singleton pattern in Rust, with a code example.",
        )
        .with_description("Response to a programming question")
        .with_expected_output(250)
        .with_category(Category::Coding),
    ]
}

pub fn summarization_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "summarize-short",
            "Short text",
            TaskKind::Summarize,
            "Artificial intelligence (AI) refers to the ability of computer systems to perform \
             tasks that normally require human intelligence. AI includes technologies such as \
             machine learning, deep learning and natural language processing. In recent years AI \
             has been applied in fields such as medicine, finance and manufacturing. In image and \
             speech recognition in particular, it often outperforms humans.",
        )
        .with_description("Summary of a short passage")
        .with_expected_output(80)
        .with_category(Category::Summarization),
        TestCase::new(
            "summarize-technical",
            "Technical document",
            TaskKind::Summarize,
            "MVVM stands for Model-View-ViewModel, an architecture pattern that organizes an \
             application's structure and improves maintainability. The Model owns data and \
             business logic and manages information from databases and APIs. The View owns the \
             user interface and handles rendering and user interaction. The ViewModel mediates \
             between the View and the Model; it holds UI logic but can be tested independently \
             of the View. The pattern separates concerns, improves testability and preserves \
             data across configuration changes.",
        )
        .with_description("Summary of technical content")
        .with_expected_output(120)
        .with_category(Category::Technical),
        TestCase::new(
            "summarize-long-article",
            "Long article",
            TaskKind::Summarize,
            "Climate change is considered one of the greatest challenges of the 21st century. \
             The average global temperature has risen by about 1.1 degrees since the industrial \
             revolution, mainly because of greenhouse gas emissions from human activity.\n\n\
             Greenhouse gases such as carbon dioxide trap heat from the sun in the atmosphere and \
             cause global warming. As a result, melting polar ice sheets, rising sea levels and \
             more frequent extreme weather have been observed.\n\n\
             Countermeasures include adopting renewable energy, improving energy efficiency, \
             protecting forests and planting trees, and saving energy at the individual level. \
             Under the Paris Agreement, countries set emission reduction targets and work \
             together to meet them.\n\n\
             Companies are also moving toward sustainable business models as interest in \
             environmental management and ESG investment grows. Individuals are asked to be \
             aware of the environmental impact of everyday choices and to change their behavior.",
        )
        .with_description("Summary of a long article")
        .with_expected_output(150)
        .with_category(Category::Summarization),
    ]
}

pub fn proofreading_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "proofread-typos",
            "Typos",
            TaskKind::Proofread,
            "I buyed a new book todya. It was very intresting and I red it all in one sitting.",
        )
        .with_description("Fixing basic spelling mistakes")
        .with_expected_output(80)
        .with_category(Category::Proofreading),
        TestCase::new(
            "proofread-grammar",
            "Grammar",
            TaskKind::Proofread,
            "This app are easy to use and have many feature. Users rates it high. \
             I think it is result of the team effort.",
        )
        .with_description("Fixing grammatical errors")
        .with_expected_output(100)
        .with_category(Category::Proofreading),
        TestCase::new(
            "proofread-politeness",
            "Polite register",
            TaskKind::Proofread,
            "About tomorrow's meeting. Is Director Tanaka gonna come? Did you get the slides done or what?",
        )
        .with_description("Fixing register for a formal business context")
        .with_expected_output(90)
        .with_category(Category::Proofreading),
        TestCase::new(
            "proofread-business",
            "Business email",
            TaskKind::Proofread,
            "Subject: project progress\n\n\
             Thank you for you continued support.\n\
             I would like to report on the progress of the project.\n\n\
             Development is going smooth and we expects to finish by end of next month as \
             planed. However the test environment setup is slightly delayed, so we may need \
             to adjust the schedule.\n\n\
             We also reviewed the additional requirements and found they can be implemented, \
             so we would like to propose them.\n\n\
             Please dont hesitate to contact me if you has any questions.",
        )
        .with_description("Proofreading a business document")
        .with_expected_output(200)
        .with_category(Category::Proofreading),
    ]
}

pub fn performance_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("perf-short", "Short response", TaskKind::Chat, "Yes")
            .with_description("Performance with a very short response")
            .with_expected_output(20)
            .with_category(Category::General),
        TestCase::new(
            "perf-medium",
            "Medium response",
            TaskKind::Chat,
            "It is nice weather today. Are you planning to go out?",
        )
        .with_description("Performance with a medium response")
        .with_expected_output(100)
        .with_category(Category::General),
        TestCase::new(
            "perf-high-load",
            "High load",
            TaskKind::Chat,
            "Describe in detail the design of a mobile application that meets these requirements:\n\
             1. MVVM architecture\n\
             2. Declarative UI toolkit\n\
             3. Local persistence with an embedded SQL database\n\
             4. REST API communication\n\
             5. Dependency injection\n\
             6. Structured concurrency for async work\n\
             7. A navigation component for screen transitions\n\
             Include the reasons for each technology choice and implementation caveats.",
        )
        .with_description("Performance under a heavy prompt")
        .with_expected_output(800)
        .with_category(Category::Technical),
    ]
}

/// Every standard test case.
pub fn all() -> Vec<TestCase> {
    let mut cases = chat_cases();
    cases.extend(summarization_cases());
    cases.extend(proofreading_cases());
    cases.extend(performance_cases());
    cases
}

/// Short suite: two chat prompts, one summary, one proofread.
pub fn quick() -> Vec<TestCase> {
    ["chat-greeting", "chat-technical", "summarize-short", "proofread-typos"]
        .into_iter()
        .filter_map(find)
        .collect()
}

pub fn by_category(category: Category) -> Vec<TestCase> {
    all().into_iter().filter(|c| c.category == category).collect()
}

pub fn find(id: &str) -> Option<TestCase> {
    all().into_iter().find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let cases = all();
        let ids: HashSet<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), cases.len());
        assert_eq!(cases.len(), 15);
    }

    #[test]
    fn test_quick_suite_covers_every_task() {
        let quick = quick();
        assert_eq!(quick.len(), 4);
        assert_eq!(quick.iter().filter(|c| c.task == TaskKind::Chat).count(), 2);
        assert!(quick.iter().any(|c| c.task == TaskKind::Summarize));
        assert!(quick.iter().any(|c| c.task == TaskKind::Proofread));
    }

    #[test]
    fn test_by_category() {
        let proofreading = by_category(Category::Proofreading);
        assert_eq!(proofreading.len(), 4);
        assert!(by_category(Category::Coding).iter().all(|c| c.category == Category::Coding));
    }

    #[test]
    fn test_find_unknown_id() {
        assert!(find("chat-greeting").is_some());
        assert!(find("nope").is_none());
    }
}
