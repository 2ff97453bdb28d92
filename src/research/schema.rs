//! JSON Schema descriptors rendered into prompts.
//!
//! These only describe the expected shape to the model. Parsing is done
//! separately by [`crate::streaming`] against the `Partial*` types.

use serde_json::{json, Value};

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

fn string_array(description: String) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": description,
    })
}

/// Shape of the query generator's answer.
pub fn search_queries_schema(num_queries: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The SERP query."
                        },
                        "researchGoal": {
                            "type": "string",
                            "description": "First talk about the goal of the research that this query is meant to accomplish, then go deeper into how to advance the research once the results are found, mention additional research directions. Be as specific as possible, especially for additional research directions."
                        }
                    },
                    "required": ["query", "researchGoal"],
                    "additionalProperties": false
                },
                "description": format!("List of SERP queries, max of {}", num_queries)
            }
        },
        "required": ["queries"],
        "additionalProperties": false,
        "$schema": DRAFT_07
    })
}

/// Shape of the result processor's answer.
pub fn search_result_schema(num_learnings: usize, num_follow_up_questions: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "learnings": string_array(format!("List of learnings, max of {}", num_learnings)),
            "followUpQuestions": string_array(format!(
                "List of follow-up questions to research the topic further, max of {}",
                num_follow_up_questions
            ))
        },
        "required": ["learnings", "followUpQuestions"],
        "additionalProperties": false,
        "$schema": DRAFT_07
    })
}

/// Shape of the clarifying-feedback answer.
pub fn feedback_schema(num_questions: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "questions": string_array(format!(
                "Follow up questions to clarify the research direction, max of {}",
                num_questions
            ))
        },
        "required": ["questions"],
        "additionalProperties": false,
        "$schema": DRAFT_07
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_schema_carries_bound() {
        let schema = search_queries_schema(4);
        assert_eq!(
            schema["properties"]["queries"]["description"],
            "List of SERP queries, max of 4"
        );
        assert_eq!(
            schema["properties"]["queries"]["items"]["required"],
            json!(["query", "researchGoal"])
        );
    }

    #[test]
    fn test_result_schema_carries_bounds() {
        let schema = search_result_schema(3, 2);
        let learnings = schema["properties"]["learnings"]["description"]
            .as_str()
            .unwrap();
        let follow_ups = schema["properties"]["followUpQuestions"]["description"]
            .as_str()
            .unwrap();
        assert!(learnings.ends_with("max of 3"));
        assert!(follow_ups.ends_with("max of 2"));
    }

    #[test]
    fn test_feedback_schema_shape() {
        let schema = feedback_schema(3);
        assert_eq!(schema["required"], json!(["questions"]));
        assert_eq!(schema["properties"]["questions"]["items"]["type"], "string");
    }
}
