//! Persistent, order-statistic `List`: an AVL tree keyed by position, so
//! `get`/`insert`/`remove`/`set` are O(log n) and `slice`/`tail` share every
//! untouched subtree with the original (spec §4.5).

use crate::error::{CollectionError, Result};
use protobase_atom::{Atom, AtomId, AtomTag, ListNodeData};
use protobase_txn::{AtomReader, Transaction};

fn load(atoms: &dyn AtomReader, id: AtomId) -> Result<Option<ListNodeData>> {
    if id.is_nil() {
        return Ok(None);
    }
    let atom = atoms
        .get_atom(&id)
        .ok_or_else(|| CollectionError::CorruptNode(format!("missing list node atom {id}")))?;
    Ok(Some(ListNodeData::from_atom(&atom)?))
}

fn count_of(atoms: &dyn AtomReader, id: AtomId) -> Result<u64> {
    Ok(load(atoms, id)?.map(|n| n.subtree_count).unwrap_or(0))
}

fn height_of(atoms: &dyn AtomReader, id: AtomId) -> Result<u8> {
    Ok(load(atoms, id)?.map(|n| n.height).unwrap_or(0))
}

/// Number of elements in the list rooted at `root`.
pub fn len(atoms: &dyn AtomReader, root: AtomId) -> Result<u64> {
    count_of(atoms, root)
}

fn make_node(txn: &mut Transaction<'_>, value: AtomId, left: AtomId, right: AtomId) -> Result<AtomId> {
    let height = 1 + height_of(txn, left)?.max(height_of(txn, right)?);
    let subtree_count = 1 + count_of(txn, left)? + count_of(txn, right)?;
    let atom = ListNodeData { value, left, right, height, subtree_count }.to_atom();
    Ok(txn.put_atom(atom))
}

fn balance_factor(atoms: &dyn AtomReader, left: AtomId, right: AtomId) -> Result<i32> {
    Ok(height_of(atoms, left)? as i32 - height_of(atoms, right)? as i32)
}

/// Rebuild a node from `(value, left, right)`, applying a single or double
/// AVL rotation if the children are more than one level out of balance.
fn rebalance(txn: &mut Transaction<'_>, value: AtomId, left: AtomId, right: AtomId) -> Result<AtomId> {
    let bf = balance_factor(txn, left, right)?;
    if bf > 1 {
        let left_node = load(txn, left)?.expect("balance factor > 1 implies a left child");
        let inner_bf = balance_factor(txn, left_node.left, left_node.right)?;
        if inner_bf < 0 {
            // Left-Right case: rotate the left child left first, then
            // rotate this node right around the result.
            let rotated_left = rotate_left(txn, left_node.value, left_node.left, left_node.right)?;
            let rotated_left_node = load(txn, rotated_left)?.expect("just built");
            return rotate_right_with(txn, value, rotated_left_node, right);
        }
        return rotate_right(txn, value, left, right);
    }
    if bf < -1 {
        let right_node = load(txn, right)?.expect("balance factor < -1 implies a right child");
        let inner_bf = balance_factor(txn, right_node.left, right_node.right)?;
        if inner_bf > 0 {
            // Right-Left case: rotate the right child right first.
            let rotated_right = rotate_right(txn, right_node.value, right_node.left, right_node.right)?;
            let rotated_right_node = load(txn, rotated_right)?.expect("just built");
            return rotate_left_with(txn, value, left, rotated_right_node);
        }
        return rotate_left(txn, value, left, right);
    }
    make_node(txn, value, left, right)
}

fn rotate_right(txn: &mut Transaction<'_>, value: AtomId, left: AtomId, right: AtomId) -> Result<AtomId> {
    let left_node = load(txn, left)?.expect("rotate_right requires a left child");
    let new_right = make_node(txn, value, left_node.right, right)?;
    make_node(txn, left_node.value, left_node.left, new_right)
}

fn rotate_right_with(
    txn: &mut Transaction<'_>,
    value: AtomId,
    left_node: ListNodeData,
    right: AtomId,
) -> Result<AtomId> {
    let new_right = make_node(txn, value, left_node.right, right)?;
    make_node(txn, left_node.value, left_node.left, new_right)
}

fn rotate_left(txn: &mut Transaction<'_>, value: AtomId, left: AtomId, right: AtomId) -> Result<AtomId> {
    let right_node = load(txn, right)?.expect("rotate_left requires a right child");
    let new_left = make_node(txn, value, left, right_node.left)?;
    make_node(txn, right_node.value, new_left, right_node.right)
}

fn rotate_left_with(
    txn: &mut Transaction<'_>,
    value: AtomId,
    left: AtomId,
    right_node: ListNodeData,
) -> Result<AtomId> {
    let new_left = make_node(txn, value, left, right_node.left)?;
    make_node(txn, right_node.value, new_left, right_node.right)
}

/// Resolve the value atom stored at `index`. `IndexError` if out of range.
pub fn get(atoms: &dyn AtomReader, root: AtomId, index: u64) -> Result<AtomId> {
    let total = count_of(atoms, root)?;
    if index >= total {
        return Err(CollectionError::IndexError { index, len: total });
    }
    get_at(atoms, root, index)
}

fn get_at(atoms: &dyn AtomReader, node: AtomId, index: u64) -> Result<AtomId> {
    let n = load(atoms, node)?.expect("index already range-checked");
    let left_count = count_of(atoms, n.left)?;
    if index < left_count {
        get_at(atoms, n.left, index)
    } else if index == left_count {
        Ok(n.value)
    } else {
        get_at(atoms, n.right, index - left_count - 1)
    }
}

/// Insert `value` at `index`, shifting later elements right. `index ==
/// len` appends.
pub fn insert(txn: &mut Transaction<'_>, root: AtomId, index: u64, value: AtomId) -> Result<AtomId> {
    let total = count_of(txn, root)?;
    if index > total {
        return Err(CollectionError::IndexError { index, len: total });
    }
    insert_at(txn, root, index, value)
}

fn insert_at(txn: &mut Transaction<'_>, node: AtomId, index: u64, value: AtomId) -> Result<AtomId> {
    if node.is_nil() {
        return make_node(txn, value, AtomId::NIL, AtomId::NIL);
    }
    let n = load(txn, node)?.expect("checked non-nil");
    let left_count = count_of(txn, n.left)?;
    if index <= left_count {
        let new_left = insert_at(txn, n.left, index, value)?;
        rebalance(txn, n.value, new_left, n.right)
    } else {
        let new_right = insert_at(txn, n.right, index - left_count - 1, value)?;
        rebalance(txn, n.value, n.left, new_right)
    }
}

/// Append `value` at the end of the list.
pub fn append(txn: &mut Transaction<'_>, root: AtomId, value: AtomId) -> Result<AtomId> {
    let len = count_of(txn, root)?;
    insert_at(txn, root, len, value)
}

/// Replace the value at `index`.
pub fn set(txn: &mut Transaction<'_>, root: AtomId, index: u64, value: AtomId) -> Result<AtomId> {
    let total = count_of(txn, root)?;
    if index >= total {
        return Err(CollectionError::IndexError { index, len: total });
    }
    set_at(txn, root, index, value)
}

fn set_at(txn: &mut Transaction<'_>, node: AtomId, index: u64, value: AtomId) -> Result<AtomId> {
    let n = load(txn, node)?.expect("checked non-nil");
    let left_count = count_of(txn, n.left)?;
    if index < left_count {
        let new_left = set_at(txn, n.left, index, value)?;
        make_node(txn, n.value, new_left, n.right)
    } else if index == left_count {
        make_node(txn, value, n.left, n.right)
    } else {
        let new_right = set_at(txn, n.right, index - left_count - 1, value)?;
        make_node(txn, n.value, n.left, new_right)
    }
}

/// Remove the element at `index`, returning the new root.
pub fn remove(txn: &mut Transaction<'_>, root: AtomId, index: u64) -> Result<AtomId> {
    let total = count_of(txn, root)?;
    if index >= total {
        return Err(CollectionError::IndexError { index, len: total });
    }
    remove_at(txn, root, index)
}

fn remove_at(txn: &mut Transaction<'_>, node: AtomId, index: u64) -> Result<AtomId> {
    let n = load(txn, node)?.expect("checked non-nil");
    let left_count = count_of(txn, n.left)?;
    if index < left_count {
        let new_left = remove_at(txn, n.left, index)?;
        rebalance(txn, n.value, new_left, n.right)
    } else if index > left_count {
        let new_right = remove_at(txn, n.right, index - left_count - 1)?;
        rebalance(txn, n.value, n.left, new_right)
    } else if n.left.is_nil() {
        Ok(n.right)
    } else if n.right.is_nil() {
        Ok(n.left)
    } else {
        let (succ_value, new_right) = remove_min(txn, n.right)?;
        rebalance(txn, succ_value, n.left, new_right)
    }
}

fn remove_min(txn: &mut Transaction<'_>, node: AtomId) -> Result<(AtomId, AtomId)> {
    let n = load(txn, node)?.expect("remove_min requires a non-nil subtree");
    if n.left.is_nil() {
        return Ok((n.value, n.right));
    }
    let (min_value, new_left) = remove_min(txn, n.left)?;
    let new_node = rebalance(txn, n.value, new_left, n.right)?;
    Ok((min_value, new_node))
}

/// Join two subtrees around a middle value, rebalancing along whichever
/// spine is taller. Gives `slice`/`tail` their O(log n) bound: the result
/// shares every subtree from `left` and `right` that wasn't on the spine
/// being descended.
fn join(txn: &mut Transaction<'_>, left: AtomId, mid: AtomId, right: AtomId) -> Result<AtomId> {
    let hl = height_of(txn, left)?;
    let hr = height_of(txn, right)?;
    if hl > hr + 1 {
        let ln = load(txn, left)?.expect("hl > 0 implies left is non-nil");
        let new_right = join(txn, ln.right, mid, right)?;
        rebalance(txn, ln.value, ln.left, new_right)
    } else if hr > hl + 1 {
        let rn = load(txn, right)?.expect("hr > 0 implies right is non-nil");
        let new_left = join(txn, left, mid, rn.left)?;
        rebalance(txn, rn.value, new_left, rn.right)
    } else {
        make_node(txn, mid, left, right)
    }
}

/// Split `root` into `(elements before `at`, elements from `at` on)`.
fn split_at(txn: &mut Transaction<'_>, node: AtomId, at: u64) -> Result<(AtomId, AtomId)> {
    if node.is_nil() {
        return Ok((AtomId::NIL, AtomId::NIL));
    }
    let n = load(txn, node)?.expect("checked non-nil");
    let left_count = count_of(txn, n.left)?;
    if at <= left_count {
        let (ll, lr) = split_at(txn, n.left, at)?;
        let right_part = join(txn, lr, n.value, n.right)?;
        Ok((ll, right_part))
    } else {
        let (rl, rr) = split_at(txn, n.right, at - left_count - 1)?;
        let left_part = join(txn, n.left, n.value, rl)?;
        Ok((left_part, rr))
    }
}

/// Elements with index `< upper_limit`.
fn take(txn: &mut Transaction<'_>, root: AtomId, upper_limit: u64) -> Result<AtomId> {
    Ok(split_at(txn, root, upper_limit)?.0)
}

/// Elements with index `>= lower_limit`.
///
/// Descent rule (must be followed exactly — an earlier implementation
/// mixed up which branch keeps `lower_limit` unchanged and which
/// subtracts, silently dropping or duplicating elements): descending into
/// the **right** subtree subtracts `left_count + 1` from `lower_limit`;
/// descending into the **left** subtree keeps `lower_limit` as-is.
pub fn tail(txn: &mut Transaction<'_>, root: AtomId, lower_limit: u64) -> Result<AtomId> {
    if root.is_nil() || lower_limit == 0 {
        return Ok(root);
    }
    let n = load(txn, root)?.expect("checked non-nil");
    let left_count = count_of(txn, n.left)?;
    if lower_limit <= left_count {
        let new_left = tail(txn, n.left, lower_limit)?;
        join(txn, new_left, n.value, n.right)
    } else {
        tail(txn, n.right, lower_limit - left_count - 1)
    }
}

/// Elements with index in `[lo, hi)`.
pub fn slice(txn: &mut Transaction<'_>, root: AtomId, lo: u64, hi: u64) -> Result<AtomId> {
    let total = count_of(txn, root)?;
    let hi = hi.min(total);
    if lo >= hi {
        return Ok(AtomId::NIL);
    }
    let prefix = take(txn, root, hi)?;
    tail(txn, prefix, lo)
}

/// Collect every value atom id in index order.
pub fn to_vec(atoms: &dyn AtomReader, root: AtomId) -> Result<Vec<AtomId>> {
    let mut out = Vec::with_capacity(count_of(atoms, root)? as usize);
    collect(atoms, root, &mut out)?;
    Ok(out)
}

fn collect(atoms: &dyn AtomReader, node: AtomId, out: &mut Vec<AtomId>) -> Result<()> {
    if node.is_nil() {
        return Ok(());
    }
    let n = load(atoms, node)?.expect("checked non-nil");
    collect(atoms, n.left, out)?;
    out.push(n.value);
    collect(atoms, n.right, out)
}

/// Whether `root` decodes as `AtomTag::ListNode` (sanity check helper for
/// callers juggling several root-object kinds under one name).
pub fn is_list_atom(tag: AtomTag) -> bool {
    tag == AtomTag::ListNode
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::Value;
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::sync::Arc;

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    fn space() -> ObjectSpace {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        ObjectSpace::open(provider, 8).unwrap()
    }

    fn build(txn: &mut Transaction<'_>, items: &[&str]) -> AtomId {
        let mut root = AtomId::NIL;
        for s in items {
            let v = txn.put_atom(value_atom(s));
            root = append(txn, root, v).unwrap();
        }
        root
    }

    fn strings(txn: &Transaction<'_>, root: AtomId) -> Vec<String> {
        to_vec(txn, root)
            .unwrap()
            .into_iter()
            .map(|id| {
                let atom = txn.get_atom(&id).unwrap();
                match Value::decode(&atom.body).unwrap().0 {
                    Value::Str(s) => s,
                    other => panic!("expected string, got {other:?}"),
                }
            })
            .collect()
    }

    #[test]
    fn append_and_get_round_trip_in_order() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "b", "c"]);
        assert_eq!(len(&txn, root).unwrap(), 3);
        assert_eq!(strings(&txn, root), vec!["a", "b", "c"]);
    }

    #[test]
    fn insert_in_the_middle_shifts_later_elements() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "c"]);
        let v = txn.put_atom(value_atom("b"));
        let root = insert(&mut txn, root, 1, v).unwrap();
        assert_eq!(strings(&txn, root), vec!["a", "b", "c"]);
    }

    #[test]
    fn set_replaces_in_place() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "b", "c"]);
        let v = txn.put_atom(value_atom("x"));
        let root = set(&mut txn, root, 1, v).unwrap();
        assert_eq!(strings(&txn, root), vec!["a", "x", "c"]);
    }

    #[test]
    fn remove_drops_element_and_preserves_order() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "b", "c", "d"]);
        let root = remove(&mut txn, root, 1).unwrap();
        assert_eq!(strings(&txn, root), vec!["a", "c", "d"]);
    }

    #[test]
    fn out_of_range_get_is_index_error() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a"]);
        assert!(matches!(get(&txn, root, 5), Err(CollectionError::IndexError { .. })));
    }

    #[test]
    fn tail_drops_a_prefix() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "b", "c", "d", "e"]);
        let root = tail(&mut txn, root, 2).unwrap();
        assert_eq!(strings(&txn, root), vec!["c", "d", "e"]);
    }

    #[test]
    fn tail_zero_returns_the_same_structure() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "b"]);
        assert_eq!(tail(&mut txn, root, 0).unwrap(), root);
    }

    #[test]
    fn slice_extracts_a_sub_range() {
        let space = space();
        let mut txn = space.new_transaction();
        let root = build(&mut txn, &["a", "b", "c", "d", "e"]);
        let root = slice(&mut txn, root, 1, 4).unwrap();
        assert_eq!(strings(&txn, root), vec!["b", "c", "d"]);
    }

    #[test]
    fn large_sequence_of_appends_stays_balanced_and_correct() {
        let space = space();
        let mut txn = space.new_transaction();
        let mut root = AtomId::NIL;
        let mut expected = Vec::new();
        for i in 0..300 {
            let s = format!("item-{i}");
            let v = txn.put_atom(value_atom(&s));
            root = append(&mut txn, root, v).unwrap();
            expected.push(s);
        }
        assert_eq!(strings(&txn, root), expected);
        let h = height_of(&txn, root).unwrap();
        assert!((h as u32) < 2 * (300f64.log2().ceil() as u32 + 1));
    }
}
