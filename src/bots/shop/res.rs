pub const SYSTEM_PROMPT: &str = "Ты вежливый консультант интернет-магазина. Отвечай коротко и по делу, на русском языке. \
Если вопрос касается заказа, возврата или неисправности товара, предложи обратиться в поддержку через кнопку «Поддержка».";

pub const HELP: &str = "Я помогу выбрать товар, активировать расширенную гарантию и связаться с поддержкой.

/start - главное меню
/support - написать в поддержку
/close - закрыть обращение
/cancel - отменить текущее действие
/clear - очистить историю диалога с ассистентом";
pub const ADMIN_HELP: &str = "Команды администратора:
/tickets - активные обращения
/broadcast - рассылка всем пользователям
/promo - загрузить промокоды
/export - выгрузка гарантий
/stats - статистика";

pub const WELCOME: &str = "Добро пожаловать! Выберите раздел:";
pub const MAIN_MENU: &str = "Главное меню";
pub const CANCELLED: &str = "Действие отменено";
pub const NOTHING_TO_CANCEL: &str = "Нечего отменять";
pub const HISTORY_CLEARED: &str = "История диалога очищена";
pub const SEND_TEXT: &str = "Пожалуйста, отправьте текстовое сообщение";
pub const AI_UNAVAILABLE: &str = "Ассистент сейчас недоступен. Воспользуйтесь меню или напишите в поддержку: /support";

pub const CHOOSE_CATEGORY: &str = "Выберите категорию:";
pub const NO_CATEGORIES: &str = "Каталог пока пуст";
pub const CHOOSE_PRODUCT: &str = "Выберите товар:";
pub const NO_PRODUCTS: &str = "В этой категории пока нет товаров";

pub const ACTIVATION_PROMPT: &str = "Чтобы активировать расширенную гарантию, оставьте отзыв с оценкой 5 звёзд \
и пришлите сюда скриншот отзыва.";
pub const ATTEMPTS_EXHAUSTED: &str = "Лимит попыток на сегодня исчерпан. Попробуйте завтра.";
pub const SCREENSHOT_USED: &str = "Этот скриншот уже использовался для активации гарантии.";
pub const NOT_FIVE_STARS: &str = "Не удалось подтвердить отзыв с оценкой 5 звёзд. Проверьте скриншот и попробуйте ещё раз.";
pub const UNDER_REVIEW: &str = "Скриншот отправлен на проверку менеджеру. Мы сообщим о результате.";
pub const REVIEW_UNAVAILABLE: &str = "Не удалось передать скриншот менеджеру. Попробуйте отправить его ещё раз позже.";
pub const PRODUCT_GONE: &str = "Товар больше не продаётся, гарантию на него активировать нельзя.";
pub const STILL_UNDER_REVIEW: &str = "Ваш скриншот ещё на проверке, пожалуйста, подождите.";
pub const SCREENSHOT_REJECTED: &str = "Менеджер не подтвердил отзыв. Вы можете попробовать ещё раз.";
pub const NO_WARRANTIES: &str = "У вас пока нет активированных гарантий";
pub const ALREADY_DECIDED: &str = "Решение по этому скриншоту уже принято";

pub const SEND_PHONE: &str = "Укажите номер телефона для связи:";
pub const BAD_PHONE: &str = "Не похоже на номер телефона. Пример: +7 999 123-45-67";
pub const SEND_DESCRIPTION: &str = "Опишите, что случилось с товаром:";
pub const EMPTY_DESCRIPTION: &str = "Описание не может быть пустым";
pub const CASE_REGISTERED: &str = "Заявка по гарантии принята. Менеджер свяжется с вами.";

pub const CHOOSE_PLATFORM: &str = "Где вы покупали товар?";
pub const TICKET_OPENED: &str = "Обращение создано. Опишите проблему, менеджер скоро подключится.";
pub const TICKET_RESUMED: &str = "У вас уже есть открытое обращение, пишите сюда.";
pub const UNREAD_REPLIES: &str = "📩 Есть непрочитанные ответы менеджера, нажмите «История».";
pub const TICKET_CLOSED: &str = "Обращение закрыто. Спасибо!";
pub const NO_TICKET: &str = "У вас нет открытых обращений";
pub const MESSAGE_SENT: &str = "Сообщение передано менеджеру";
pub const MESSAGE_NOT_DELIVERED: &str = "Сообщение сохранено в обращении, но менеджеры сейчас недоступны. Мы ответим, как только сможем.";
pub const TICKET_TAKEN: &str = "Обращение уже взято другим менеджером";
pub const TICKET_ACCEPTED_USER: &str = "Менеджер подключился к вашему обращению";
pub const RESPOND_PROMPT: &str = "Пишите ответ, он будет отправлен пользователю. /cancel - выйти";
pub const NO_ACTIVE_TICKETS: &str = "Активных обращений нет";
pub const REMINDER: &str = "⏰ Обращение ждёт ответа больше 5 минут";
pub const SECOND_REMINDER: &str = "⏰⏰ Обращение ждёт ответа больше 10 минут";
pub const ESCALATION: &str = "🚨 Обращение без ответа больше 15 минут";

pub const PROMO_NONE_LEFT: &str = "Промокоды закончились, загляните позже";
pub const PROMO_INTAKE: &str = "Пришлите промокоды через пробел, запятую или с новой строки";
pub const BROADCAST_PROMPT: &str = "Пришлите сообщение для рассылки. /cancel - отменить";

pub const ERR_NOT_FOUND: &str = "Не найдено. Возможно, данные устарели, начните заново: /start";
pub const ERR_PERMISSION: &str = "Недостаточно прав";
pub const ERR_UPSTREAM: &str = "Сервис временно недоступен, попробуйте позже";
pub const ERR_VALIDATION: &str = "Некорректные данные, попробуйте ещё раз";

pub const BTN_CATALOG: &str = "🛍 Каталог";
pub const BTN_WARRANTIES: &str = "🛡 Мои гарантии";
pub const BTN_PROMO: &str = "🎁 Промокод";
pub const BTN_SUPPORT: &str = "💬 Поддержка";
pub const BTN_BACK: &str = "⬅️ Назад";
pub const BTN_WARRANTY: &str = "🛡 Гарантия";
pub const BTN_REVIEW: &str = "✍️ Оставить отзыв";
pub const BTN_REPORT_CASE: &str = "Сообщить о гарантийном случае";
pub const BTN_RETRY: &str = "🔄 Попробовать ещё раз";
pub const BTN_ACCEPT: &str = "✅ Взять";
pub const BTN_RESPOND: &str = "✏️ Ответить";
pub const BTN_HISTORY: &str = "📜 История";
pub const BTN_CLOSE: &str = "❌ Закрыть";
pub const BTN_APPROVE: &str = "✅ Подтвердить";
pub const BTN_REJECT: &str = "❌ Отклонить";
