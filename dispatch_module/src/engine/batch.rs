use super::types::{Batch, Recipient, MAX_BATCH_SIZE};

/// Split `fresh` into consecutive chunks of at most `max_batch_size`,
/// preserving input order. Deterministic: an interrupted dispatch that is
/// resumed re-derives exactly the same batch boundaries.
pub fn plan(fresh: Vec<Recipient>, max_batch_size: usize) -> Vec<Batch> {
    assert!(max_batch_size > 0, "batch size must be positive");
    let mut batches = Vec::with_capacity(fresh.len().div_ceil(max_batch_size));
    let mut recipients = fresh.into_iter().peekable();
    let mut seq = 0usize;
    while recipients.peek().is_some() {
        let chunk: Vec<Recipient> = recipients.by_ref().take(max_batch_size).collect();
        batches.push(Batch {
            seq,
            recipients: chunk,
        });
        seq += 1;
    }
    batches
}

pub fn plan_default(fresh: Vec<Recipient>) -> Vec<Batch> {
    plan(fresh, MAX_BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipients(count: usize) -> Vec<Recipient> {
        (0..count)
            .map(|index| Recipient {
                id: index as i64,
                email: format!("user{index}@example.com"),
                display_name: None,
                company: None,
            })
            .collect()
    }

    #[test]
    fn splits_250_recipients_into_200_and_50() {
        let batches = plan_default(recipients(250));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].recipients.len(), 200);
        assert_eq!(batches[1].recipients.len(), 50);
        assert_eq!(batches[0].seq, 0);
        assert_eq!(batches[1].seq, 1);
    }

    #[test]
    fn batch_sizes_sum_to_input_length() {
        for count in [0, 1, 199, 200, 201, 777] {
            let batches = plan_default(recipients(count));
            let total: usize = batches.iter().map(|batch| batch.recipients.len()).sum();
            assert_eq!(total, count);
            assert_eq!(batches.len(), count.div_ceil(MAX_BATCH_SIZE));
        }
    }

    #[test]
    fn preserves_input_order() {
        let batches = plan(recipients(5), 2);
        let flattened: Vec<i64> = batches
            .iter()
            .flat_map(|batch| batch.recipients.iter().map(|recipient| recipient.id))
            .collect();
        assert_eq!(flattened, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(plan_default(Vec::new()).is_empty());
    }
}
