//! All user-facing message text, in one place.
//!
//! The bot speaks Uzbek in Latin script; the notification to the operator
//! channel mixes in the labels the operators asked for.

use crate::engine::event::{Menu, MenuAction, MenuButton};
use crate::engine::session::Draft;
use crate::store::Record;

pub const UZ_ONLY_NOTE: &str = "⚠️ Iltimos, faqat **o'zbek tilida (lotin yozuvida)** yozing.\n\
     Masalan: Otabek Qodirov yoki +998 94 999 99 99";

pub const ASK_NAME: &str = "Boshladik. Iltimos, FIO yozing:";

pub const NAME_EMPTY: &str = "Iltimos, FIO kiriting.";

pub const ASK_PHONE: &str = "Telefon raqamni kiriting (namuna: +998 94 999 99 99):";

pub const PHONE_FORMAT_ERROR: &str = "❌ Telefon formati xato!\n\
     To'g'ri namuna: +998 94 999 99 99\n\
     Iltimos, qaytadan kiriting.";

pub const ASK_ADDRESS: &str = "Endi **TO'LIQ MANZIL** ni yuboring (posilkani qabul qilish uchun):\n\
     Namuna: Namangan viloyati, Uychi tumani, Soku MFY, \
     Gulzor mahalla, Donishmatlar ko'chasi, 15-uy";

pub const ADDRESS_TOO_SHORT: &str = "Manzil juda qisqa. Iltimos, to'liq manzil kiriting.";

pub const EDIT_NAME: &str = "✏️ Yangi FIO ni kiriting:";
pub const EDIT_PHONE: &str = "✏️ Yangi telefon (namuna: +998 94 999 99 99):";
pub const EDIT_ADDRESS: &str = "✏️ Yangi to'liq manzilni kiriting:";

pub const SAVED_AND_NOTIFIED: &str =
    "✅ Saqlandi va kanal xabardor qilindi! Yangi yozuv uchun /start yuboring.";

pub const SAVED_NOTIFY_FAILED: &str =
    "✅ Saqlandi, lekin kanalga xabar yuborishda muammo. Yangi yozuv uchun /start yuboring.";

pub const CANCELLED: &str = "Bekor qilindi. Qayta boshlash uchun /start yuboring.";

/// Hint for free text arriving with no intake in flight.
pub const NO_SESSION_HINT: &str = "Boshlash uchun /start yuboring.";

pub fn welcome() -> String {
    format!(
        "Assalomu alaykum! 👋\n\
         Ushbu bot ma'lumotlaringizni qabul qilib, Google Jadvalga saqlaydi.\n\n\
         Ma'lumotlarni quyidagi tartibda yuboring:\n\
         1) FIO (masalan: Otabek Qodirov)\n\
         2) Telefon raqami (qat'iy format: +998 94 999 99 99)\n\
         3) To'liq manzil (posilkani qabul qilish uchun)\n   \
         Masalan: Namangan viloyati, Uychi tumani, Soku MFY, \
         Gulzor mahalla, Donishmatlar ko'chasi, 15-uy\n\n\
         {UZ_ONLY_NOTE}\n\n\
         Boshladik. Iltimos, FIO yozing:"
    )
}

pub fn script_error() -> String {
    format!("Iltimos, **lotin yozuvida** yozing. {UZ_ONLY_NOTE}")
}

/// The review summary shown on every entry to the confirm state.
pub fn summary(draft: &Draft) -> String {
    format!(
        "Iltimos, ma'lumotlarni tekshiring:\n\
         • FIO: {}\n\
         • Telefon: {}\n\
         • Manzil: {}\n\n\
         Kerakli amalni tanlang:",
        draft.name.as_deref().unwrap_or(""),
        draft.phone.as_deref().unwrap_or(""),
        draft.address.as_deref().unwrap_or(""),
    )
}

/// The fixed five-row confirmation menu, always in this order.
pub fn summary_menu() -> Menu {
    vec![
        vec![MenuButton::new("✏️ FIO-ni tahrirlash", MenuAction::EditName)],
        vec![MenuButton::new("✏️ Telefonni tahrirlash", MenuAction::EditPhone)],
        vec![MenuButton::new("✏️ Manzilni tahrirlash", MenuAction::EditAddress)],
        vec![MenuButton::new("🔄 Hammasini boshidan", MenuAction::EditAll)],
        vec![
            MenuButton::new("✅ Saqlash", MenuAction::Save),
            MenuButton::new("❌ Bekor qilish", MenuAction::Cancel),
        ],
    ]
}

pub fn save_failed(detail: &str) -> String {
    format!(
        "⚠️ Saqlashda xatolik.\n\
         Sabab: {detail}\n\
         Iltimos, birozdan so'ng qayta urinib ko'ring."
    )
}

/// The message posted to the operator channel after a successful save.
pub fn channel_notification(record: &Record) -> String {
    format!(
        "🔔 Yangi foydalanuvchi qo'shildi:\n\n\
         👤 FIO: {}\n\
         📞 Номер: {}\n\
         🏠 Адрес: {}\n\
         🏷 Никнайм: @{}\n\
         🆔 ИД номер: {}\n\
         ⏰ Время: {}\n\n\
         ✅ Человек занесен в базу данных",
        record.name,
        record.phone,
        record.address,
        record.submitter_handle,
        record.submitter_id,
        record.submitted_at.format("%Y-%m-%d %H:%M:%S"),
    )
}
