use filterhose_core::StreamMessage;
use serde_json::Value;

/// Envelope keys checked after `text`, in priority order.
const ENVELOPES: [(&str, fn(Value) -> StreamMessage); 7] = [
    ("delete", StreamMessage::Delete),
    ("scrub_geo", StreamMessage::ScrubGeo),
    ("limit", StreamMessage::Limit),
    ("status_withheld", StreamMessage::StatusWithheld),
    ("user_withheld", StreamMessage::UserWithheld),
    ("disconnect", StreamMessage::Disconnect),
    ("warning", StreamMessage::Warning),
];

/// Route a decoded object to the first message kind whose key it carries.
pub fn demultiplex(value: Value) -> StreamMessage {
    let Value::Object(mut object) = value else {
        return StreamMessage::Unrecognized(value);
    };

    if object.contains_key("text") {
        return StreamMessage::Tweet(Value::Object(object));
    }
    for (key, wrap) in ENVELOPES {
        if let Some(inner) = object.remove(key) {
            return wrap(inner);
        }
    }
    StreamMessage::Unrecognized(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn delete_carries_inner_payload() {
        let msg = demultiplex(json!({"delete": {"status": {"id_str": "1"}}}));
        assert_eq!(msg, StreamMessage::Delete(json!({"status": {"id_str": "1"}})));
    }

    #[test]
    fn tweet_carries_whole_object() {
        let tweet = json!({"text": "Taco", "id_str": "42", "user": {"screen_name": "t"}});
        assert_eq!(demultiplex(tweet.clone()), StreamMessage::Tweet(tweet));
    }

    #[test]
    fn text_wins_over_envelope_keys() {
        let msg = demultiplex(json!({"text": "x", "limit": {"track": 1}}));
        assert!(matches!(msg, StreamMessage::Tweet(_)));
    }

    #[test]
    fn first_envelope_key_wins() {
        let msg = demultiplex(json!({"warning": {"code": "FALLING_BEHIND"}, "limit": {"track": 9}}));
        assert_eq!(msg, StreamMessage::Limit(json!({"track": 9})));
    }

    #[test]
    fn routes_every_envelope() {
        let cases = [
            ("scrub_geo", "scrub_geo"),
            ("limit", "limit"),
            ("status_withheld", "status_withheld"),
            ("user_withheld", "user_withheld"),
            ("disconnect", "disconnect"),
            ("warning", "warning"),
        ];
        for (key, name) in cases {
            let mut object = serde_json::Map::new();
            object.insert(key.to_string(), json!({"code": 1}));
            let msg = demultiplex(Value::Object(object));
            assert_eq!(msg.event_name(), name);
            assert_eq!(msg.payload(), &json!({"code": 1}));
        }
    }

    #[test]
    fn unknown_shapes_are_unrecognized() {
        assert!(!demultiplex(json!({"friends": [1, 2]})).is_recognized());
        assert!(!demultiplex(json!([1, 2, 3])).is_recognized());
        assert!(!demultiplex(json!("text")).is_recognized());
    }
}
