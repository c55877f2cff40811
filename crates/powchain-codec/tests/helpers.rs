use powchain_core::Blockchain;
use serde_json::json;

/// A short mined chain at difficulty 1 so codec tests stay fast.
pub fn sample_chain() -> Blockchain {
    let mut chain = Blockchain::new(1).expect("genesis mining");
    chain
        .add_block(json!({"note": "first", "amount": 5}))
        .expect("mining");
    chain
        .add_block(json!([1, 2, {"nested": true}]))
        .expect("mining");
    chain
}
