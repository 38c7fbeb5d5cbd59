use super::{Op, OpKind};
use crate::entry::EntryType;
use crate::error::Result;

impl Op {
    /// The op that undoes this one, for telling local watchers about
    ///  a change that resolution threw away. Only good enough for
    ///  notifications: a re-created entry's type is a guess and admin
    ///  ops invert to themselves. Never persisted.
    pub fn invert_for_local_notifications(&self) -> Result<Op> {
        let mut inverted = match &self.kind {
            OpKind::Create(co) => Op::rm(&co.new_name, co.dir.new, co.entry_type)?,
            OpKind::Rm(rm) => Op::create(&rm.old_name, rm.dir.new, EntryType::File)?,
            OpKind::Rename(rename) => Op::rename(
                &rename.new_name,
                rename.dest_dir().new,
                &rename.old_name,
                rename.old_dir.new,
                rename.renamed,
                rename.renamed_type,
            )?,
            OpKind::Sync(so) => {
                // the same ranges mark the same bytes dirty
                let mut op = Op::sync(so.file.new)?;
                if let OpKind::Sync(inner) = &mut op.kind {
                    inner.writes = so.writes.clone();
                }
                op
            }
            OpKind::SetAttr(sao) => Op::set_attr(&sao.name, sao.dir.new, sao.attr, sao.file)?,
            OpKind::Resolution => Op::resolution(),
            OpKind::Rekey => Op::rekey(),
            OpKind::Gc(gc) => Op::gc(gc.latest_rev),
        };
        inverted.set_writer_info(self.common.writer.clone());
        inverted.set_local_timestamp(self.common.local_timestamp);

        for update in self.all_updates() {
            inverted.add_update(update.new, update.old);
        }
        Ok(inverted)
    }
}
