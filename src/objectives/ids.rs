use rand::distributions::Alphanumeric;
use rand::Rng;

pub const ID_LEN: usize = 40;
pub const PARTITION_LEN: usize = ID_LEN * 2;

fn is_token(s: &str, len: usize) -> bool {
    s.len() == len
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub fn is_user_id(s: &str) -> bool {
    is_token(s, ID_LEN)
}

pub fn is_objective_id(s: &str) -> bool {
    is_token(s, ID_LEN)
}

pub fn is_item_id(s: &str) -> bool {
    is_token(s, ID_LEN)
}

pub fn is_user_id_objective_id(s: &str) -> bool {
    is_token(s, PARTITION_LEN)
}

/// Fresh 40 character alphanumeric id for a record submitted with an empty id.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Item partition key for `user_id`. Only the trailing 40 characters of the client value are
/// kept, so a client can name one of its objectives but never another user's partition.
pub fn compose_partition(user_id: &str, client_value: &str) -> String {
    let suffix = match client_value.char_indices().rev().nth(ID_LEN - 1) {
        Some((start, _)) => &client_value[start..],
        None => client_value,
    };

    format!("{}{}", user_id, suffix)
}
