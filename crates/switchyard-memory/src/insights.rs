//! Aggregate view over a thread's summaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use switchyard_core::types::{ConversationSummary, Sentiment, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationInsights {
    pub top_topics: Vec<TopicCount>,
    pub overall_sentiment: Sentiment,
    pub summary_count: usize,
    pub messages_summarized: u64,
    /// Start of the first summarized range to the end of the last.
    pub span_start: Timestamp,
    pub span_end: Timestamp,
}

impl ConversationInsights {
    /// `None` when there is nothing summarized yet.
    ///
    /// Topics are ranked by frequency, ties alphabetically. Sentiment is the
    /// majority vote; a tie for first place is neutral.
    pub fn from_summaries(summaries: &[ConversationSummary], max_topics: usize) -> Option<Self> {
        let first = summaries.first()?;
        let last = summaries.last()?;

        let mut topic_counts: HashMap<&str, usize> = HashMap::new();
        for topic in summaries.iter().flat_map(|s| s.topics.iter()) {
            *topic_counts.entry(topic.as_str()).or_insert(0) += 1;
        }
        let mut top_topics: Vec<TopicCount> = topic_counts
            .into_iter()
            .map(|(topic, count)| TopicCount {
                topic: topic.to_string(),
                count,
            })
            .collect();
        top_topics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
        top_topics.truncate(max_topics);

        Some(Self {
            top_topics,
            overall_sentiment: majority_sentiment(summaries),
            summary_count: summaries.len(),
            messages_summarized: summaries.iter().map(|s| s.message_count as u64).sum(),
            span_start: first.start_ts,
            span_end: last.end_ts,
        })
    }
}

fn majority_sentiment(summaries: &[ConversationSummary]) -> Sentiment {
    let count = |wanted: Sentiment| summaries.iter().filter(|s| s.sentiment == wanted).count();
    let positive = count(Sentiment::Positive);
    let neutral = count(Sentiment::Neutral);
    let negative = count(Sentiment::Negative);

    if positive > neutral && positive > negative {
        Sentiment::Positive
    } else if negative > neutral && negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(i: i64, topics: &[&str], sentiment: Sentiment) -> ConversationSummary {
        ConversationSummary {
            id: i,
            thread_id: "t1".into(),
            summary_text: format!("summary {}", i),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            sentiment,
            message_count: 20,
            start_ts: Timestamp(i * 100),
            end_ts: Timestamp((i + 1) * 100),
            created_at: Timestamp((i + 1) * 100 + 1),
        }
    }

    #[test]
    fn test_none_without_summaries() {
        assert!(ConversationInsights::from_summaries(&[], 5).is_none());
    }

    #[test]
    fn test_aggregates_topics_and_counts() {
        let summaries = vec![
            summary(0, &["circle line", "arrival times"], Sentiment::Positive),
            summary(1, &["circle line", "journey planning"], Sentiment::Positive),
            summary(2, &["district line", "circle line", "arrival times"], Sentiment::Negative),
        ];
        let insights = ConversationInsights::from_summaries(&summaries, 2).unwrap();
        assert_eq!(
            insights.top_topics,
            vec![
                TopicCount { topic: "circle line".into(), count: 3 },
                TopicCount { topic: "arrival times".into(), count: 2 },
            ]
        );
        assert_eq!(insights.overall_sentiment, Sentiment::Positive);
        assert_eq!(insights.summary_count, 3);
        assert_eq!(insights.messages_summarized, 60);
        assert_eq!(insights.span_start, Timestamp(0));
        assert_eq!(insights.span_end, Timestamp(300));
    }

    #[test]
    fn test_sentiment_tie_is_neutral() {
        let summaries = vec![
            summary(0, &[], Sentiment::Positive),
            summary(1, &[], Sentiment::Negative),
        ];
        let insights = ConversationInsights::from_summaries(&summaries, 5).unwrap();
        assert_eq!(insights.overall_sentiment, Sentiment::Neutral);
        assert!(insights.top_topics.is_empty());
    }
}
